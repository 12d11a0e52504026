use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Directory searched for the daemon configuration template.
pub const DEFAULT_TEMPLATE_DIR: &str = "/ka-templates";

/// Template rendered into the daemon configuration file.
pub const DEFAULT_TEMPLATE_NAME: &str = "keepalived.conf";

/// Location of the rendered daemon configuration.
pub const DEFAULT_DAEMON_CONFIG_PATH: &str = "/etc/keepalived/keepalived.conf";

/// Account owning the rendered configuration.
pub const DEFAULT_CONFIG_OWNER: &str = "root";

/// Group owning the rendered configuration.
pub const DEFAULT_CONFIG_GROUP: &str = "root";

/// Permission bits applied to the rendered configuration.
pub const DEFAULT_CONFIG_MODE: u32 = 0o644;

/// Directory holding operator supplied check scripts.
pub const DEFAULT_SCRIPTS_DIR: &str = "/ka-data/scripts";

/// The supervised VRRP daemon.
pub const DEFAULT_DAEMON_BINARY: &str = "/usr/sbin/keepalived";

/// Built-in HTTP probe used when the URL check is enabled.
pub const DEFAULT_PROBE_EXECUTABLE: &str = "/usr/local/bin/kentry-probe";

/// Seconds a check script may run during startup validation.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default template directory as an owned path.
#[must_use]
pub fn default_template_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_TEMPLATE_DIR)
}

/// Default template name as an owned string.
#[must_use]
pub fn default_template_name() -> String {
    DEFAULT_TEMPLATE_NAME.to_owned()
}

/// Default rendered configuration path.
#[must_use]
pub fn default_daemon_config_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DAEMON_CONFIG_PATH)
}

/// Default configuration owner.
#[must_use]
pub fn default_config_owner() -> String {
    DEFAULT_CONFIG_OWNER.to_owned()
}

/// Default configuration group.
#[must_use]
pub fn default_config_group() -> String {
    DEFAULT_CONFIG_GROUP.to_owned()
}

/// Default check script directory.
#[must_use]
pub fn default_scripts_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_SCRIPTS_DIR)
}

/// Default daemon executable.
#[must_use]
pub fn default_daemon_binary() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DAEMON_BINARY)
}

/// Default probe executable.
#[must_use]
pub fn default_probe_executable() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_PROBE_EXECUTABLE)
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
