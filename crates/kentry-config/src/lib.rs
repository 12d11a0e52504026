//! Settings shared by the kentry supervisor and its helpers.
//!
//! The VRRP instance itself is described on the command line; everything
//! about *where* the supervisor finds its template, writes the rendered
//! configuration and locates the daemon lives here. [`Settings`] is layered by
//! `ortho_config`: built-in defaults, then an optional configuration file,
//! then `KENTRY_*` environment variables, then command-line flags when a
//! caller chooses to forward them.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_CHECK_TIMEOUT_SECS, DEFAULT_CONFIG_GROUP, DEFAULT_CONFIG_MODE, DEFAULT_CONFIG_OWNER,
    DEFAULT_DAEMON_BINARY, DEFAULT_DAEMON_CONFIG_PATH, DEFAULT_LOG_FILTER,
    DEFAULT_PROBE_EXECUTABLE, DEFAULT_SCRIPTS_DIR, DEFAULT_TEMPLATE_DIR, DEFAULT_TEMPLATE_NAME,
    default_config_group, default_config_owner, default_daemon_binary,
    default_daemon_config_path, default_log_filter, default_log_filter_string,
    default_log_format, default_probe_executable, default_scripts_dir, default_template_dir,
    default_template_name,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Program name handed to the loader in place of `argv[0]`.
const PROGRAM_NAME: &str = "kentry";

/// Supervisor settings resolved from defaults, files and the environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KENTRY")]
pub struct Settings {
    /// Directory searched for the daemon configuration template.
    #[ortho_config(default = defaults::default_template_dir())]
    pub template_dir: Utf8PathBuf,
    /// Name of the template rendered into the daemon configuration.
    #[ortho_config(default = defaults::default_template_name())]
    pub template_name: String,
    /// Where the rendered daemon configuration is written.
    #[ortho_config(default = defaults::default_daemon_config_path())]
    pub daemon_config_path: Utf8PathBuf,
    /// Account that owns the rendered configuration.
    #[ortho_config(default = defaults::default_config_owner())]
    pub config_owner: String,
    /// Group that owns the rendered configuration.
    #[ortho_config(default = defaults::default_config_group())]
    pub config_group: String,
    /// Permission bits applied to the rendered configuration.
    #[ortho_config(default = defaults::DEFAULT_CONFIG_MODE)]
    pub config_mode: u32,
    /// Directory holding operator supplied check scripts.
    #[ortho_config(default = defaults::default_scripts_dir())]
    pub scripts_dir: Utf8PathBuf,
    /// Executable of the supervised VRRP daemon.
    #[ortho_config(default = defaults::default_daemon_binary())]
    pub daemon_binary: Utf8PathBuf,
    /// Executable of the built-in HTTP probe.
    #[ortho_config(default = defaults::default_probe_executable())]
    pub probe_executable: Utf8PathBuf,
    /// Seconds a check script may run while being validated at startup.
    #[ortho_config(default = defaults::DEFAULT_CHECK_TIMEOUT_SECS)]
    pub check_timeout_secs: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Telemetry output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Settings {
    /// Loads settings from the configuration file and environment only.
    ///
    /// The supervisor's own command line describes the VRRP instance and is
    /// parsed separately, so the loader only ever sees the program name.
    pub fn load_from_environment() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter([OsString::from(PROGRAM_NAME)])
    }

    /// Template directory.
    #[must_use]
    pub fn template_dir(&self) -> &Utf8Path {
        &self.template_dir
    }

    /// Rendered configuration path.
    #[must_use]
    pub fn daemon_config_path(&self) -> &Utf8Path {
        &self.daemon_config_path
    }

    /// Check script directory.
    #[must_use]
    pub fn scripts_dir(&self) -> &Utf8Path {
        &self.scripts_dir
    }

    /// Daemon executable.
    #[must_use]
    pub fn daemon_binary(&self) -> &Utf8Path {
        &self.daemon_binary
    }

    /// Probe executable.
    #[must_use]
    pub fn probe_executable(&self) -> &Utf8Path {
        &self.probe_executable
    }

    /// Budget granted to a check script during startup validation.
    #[must_use]
    pub const fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            template_name: default_template_name(),
            daemon_config_path: default_daemon_config_path(),
            config_owner: default_config_owner(),
            config_group: default_config_group(),
            config_mode: DEFAULT_CONFIG_MODE,
            scripts_dir: default_scripts_dir(),
            daemon_binary: default_daemon_binary(),
            probe_executable: default_probe_executable(),
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_point_at_container_layout() {
        let settings = Settings::default();
        assert_eq!(settings.template_dir(), Utf8Path::new("/ka-templates"));
        assert_eq!(settings.template_name, "keepalived.conf");
        assert_eq!(
            settings.daemon_config_path(),
            Utf8Path::new("/etc/keepalived/keepalived.conf")
        );
        assert_eq!(settings.config_mode, 0o644);
        assert_eq!(settings.check_timeout(), Duration::from_secs(30));
        assert_eq!(settings.log_format(), LogFormat::Json);
    }
}
