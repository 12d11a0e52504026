//! Maps a validated VRRP instance request onto the template context.
//!
//! [`ConfigAssembler`] is pure: it consults the interface catalog it was
//! given and never touches the filesystem. Everything it rejects is a
//! misconfiguration, which the supervisor reports and exits 0 for.

use std::fmt;
use std::net::AddrParseError;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use kentry_probe::{ProbeError, normalise_url};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::network::HostInterfaces;

mod vip;

pub use vip::VirtualIpSpec;

/// Authentication password used when none is given.
pub const DEFAULT_AUTH_PASS: &str = "12345678";

/// Virtual router id used when none is given.
pub const DEFAULT_VIRTUAL_ROUTER_ID: u8 = 1;

/// Reasons an instance request is rejected.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A VIP declaration did not have three segments.
    #[error("the argument {spec} provided does not have 3 '/' delimited arguments")]
    MalformedVip {
        /// Declaration as given.
        spec: String,
    },
    /// A VIP address did not parse.
    #[error("the IP {address} does not appear to be valid (returned {source})")]
    InvalidAddress {
        /// Address segment as given.
        address: String,
        /// Parser error.
        #[source]
        source: AddrParseError,
    },
    /// A VIP prefix was not a length valid for its address family.
    #[error("the prefix length {prefix} in {spec} is not valid for its address")]
    InvalidPrefix {
        /// Declaration as given.
        spec: String,
        /// Prefix segment as given.
        prefix: String,
    },
    /// An interface is not present on this host.
    #[error("the iface {name} does not appear to be a valid interface on this host")]
    UnknownInterface {
        /// Interface name as given.
        name: String,
    },
    /// Both check script flags were given.
    #[error("both --override-check and --enable-check are enabled")]
    ConflictingCheckModes,
    /// The override script name escapes the scripts directory.
    #[error("the override check {name} must name a file inside {dir}")]
    ScriptOutsideDirectory {
        /// Script name as given.
        name: String,
        /// Directory scripts are resolved against.
        dir: Utf8PathBuf,
    },
    /// The built-in check URL is unusable.
    #[error("the check URL is not usable: {source}")]
    InvalidProbeUrl {
        /// Probe URL error.
        #[source]
        source: ProbeError,
    },
}

/// How the instance's health is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CheckScriptMode {
    /// No check script.
    #[default]
    None,
    /// An operator supplied script, resolved inside the scripts directory.
    OverridePath(Utf8PathBuf),
    /// The built-in HTTP probe against a URL.
    BuiltinProbe(Url),
}

/// Check script settings as seen by the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckScriptConfig {
    enabled: bool,
    path: Option<String>,
    interval: u32,
    rise: u32,
    fall: u32,
    url: Option<String>,
}

impl CheckScriptConfig {
    fn from_mode(mode: &CheckScriptMode, request: &CheckRequest) -> Self {
        let (path, url) = match mode {
            CheckScriptMode::None => (None, None),
            CheckScriptMode::OverridePath(path) => (Some(path.to_string()), None),
            CheckScriptMode::BuiltinProbe(url) => (None, Some(url.to_string())),
        };
        Self {
            enabled: !matches!(mode, CheckScriptMode::None),
            path,
            interval: request.interval,
            rise: request.rise,
            fall: request.fall,
            url,
        }
    }

    /// Whether a check script is configured.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Override script path, when one is configured.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Probe URL, when the built-in probe is configured.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// Check script flags from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Script name inside the scripts directory.
    pub override_script: Option<String>,
    /// URL for the built-in probe.
    pub probe_url: Option<String>,
    /// Seconds between checks.
    pub interval: u32,
    /// Successes needed to recover.
    pub rise: u32,
    /// Failures needed to fault.
    pub fall: u32,
}

impl Default for CheckRequest {
    fn default() -> Self {
        Self {
            override_script: None,
            probe_url: None,
            interval: 2,
            rise: 2,
            fall: 2,
        }
    }
}

/// The VRRP instance described on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    /// Name of the VRRP instance.
    pub router_name: String,
    /// Whether this node starts as master.
    pub master: bool,
    /// VRRP authentication password.
    pub auth_pass: Option<String>,
    /// Virtual router id.
    pub vrid: Option<u8>,
    /// Election priority.
    pub priority: u8,
    /// Interface adverts are sent over.
    pub track_iface: String,
    /// VIP declarations managed by the instance.
    pub include: Vec<String>,
    /// VIP declarations listed as excluded.
    pub exclude: Vec<String>,
    /// Health check flags.
    pub check: CheckRequest,
}

/// Values substituted into the daemon configuration template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    router_name: String,
    track_iface: String,
    is_master: bool,
    auth_pass: String,
    virtual_router_id: u8,
    priority: u8,
    check_script: CheckScriptConfig,
    virtual_ipaddresses: Vec<VirtualIpSpec>,
    probe_executable: String,
}

impl RenderContext {
    /// Name of the VRRP instance.
    #[must_use]
    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    /// Whether this node starts as master.
    #[must_use]
    pub const fn is_master(&self) -> bool {
        self.is_master
    }

    /// Authentication password, defaulted when not given.
    #[must_use]
    pub fn auth_pass(&self) -> &str {
        &self.auth_pass
    }

    /// Virtual router id, defaulted when not given.
    #[must_use]
    pub const fn virtual_router_id(&self) -> u8 {
        self.virtual_router_id
    }

    /// Election priority.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// Check script settings.
    #[must_use]
    pub const fn check_script(&self) -> &CheckScriptConfig {
        &self.check_script
    }

    /// Included addresses first, then excluded ones, each in command-line order.
    #[must_use]
    pub fn virtual_ipaddresses(&self) -> &[VirtualIpSpec] {
        &self.virtual_ipaddresses
    }
}

/// Insecure or conflict-prone defaults applied during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyWarning {
    /// No authentication password was given.
    DefaultAuthPass,
    /// No virtual router id was given.
    DefaultRouterId,
}

impl fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultAuthPass => f.write_str(
                "WARNING: Using this container without a set auth pass will make this container insecure.",
            ),
            Self::DefaultRouterId => f.write_str(
                "WARNING: Not setting a vrid could result in a conflict. Please specify a vrid to avoid possible conflicts",
            ),
        }
    }
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Template context.
    pub context: RenderContext,
    /// Check mode the context was derived from.
    pub check_mode: CheckScriptMode,
    /// Defaults that were applied.
    pub warnings: Vec<AssemblyWarning>,
}

/// Validates instance requests against the host and builds the context.
#[derive(Debug, Clone, Copy)]
pub struct ConfigAssembler<'a> {
    interfaces: &'a HostInterfaces,
    scripts_dir: &'a Utf8Path,
    probe_executable: &'a Utf8Path,
}

impl<'a> ConfigAssembler<'a> {
    /// Creates an assembler for the given host catalog and paths.
    #[must_use]
    pub const fn new(
        interfaces: &'a HostInterfaces,
        scripts_dir: &'a Utf8Path,
        probe_executable: &'a Utf8Path,
    ) -> Self {
        Self {
            interfaces,
            scripts_dir,
            probe_executable,
        }
    }

    /// Validates `request` and produces the render context.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking the tracked
    /// interface, then included VIPs, then excluded VIPs, then the check
    /// script flags.
    pub fn assemble(&self, request: &InstanceRequest) -> Result<Assembly, ValidationError> {
        let mut warnings = Vec::new();
        let auth_pass = request.auth_pass.clone().unwrap_or_else(|| {
            warnings.push(AssemblyWarning::DefaultAuthPass);
            DEFAULT_AUTH_PASS.to_owned()
        });
        let virtual_router_id = request.vrid.unwrap_or_else(|| {
            warnings.push(AssemblyWarning::DefaultRouterId);
            DEFAULT_VIRTUAL_ROUTER_ID
        });

        if !self.interfaces.contains(&request.track_iface) {
            return Err(ValidationError::UnknownInterface {
                name: request.track_iface.clone(),
            });
        }

        let included = request
            .include
            .iter()
            .map(|spec| VirtualIpSpec::parse(spec, true, self.interfaces));
        let excluded = request
            .exclude
            .iter()
            .map(|spec| VirtualIpSpec::parse(spec, false, self.interfaces));
        let virtual_ipaddresses = included.chain(excluded).collect::<Result<Vec<_>, _>>()?;

        let check_mode = self.check_mode(&request.check)?;
        let context = RenderContext {
            router_name: request.router_name.clone(),
            track_iface: request.track_iface.clone(),
            is_master: request.master,
            auth_pass,
            virtual_router_id,
            priority: request.priority,
            check_script: CheckScriptConfig::from_mode(&check_mode, &request.check),
            virtual_ipaddresses,
            probe_executable: self.probe_executable.to_string(),
        };
        Ok(Assembly {
            context,
            check_mode,
            warnings,
        })
    }

    fn check_mode(&self, check: &CheckRequest) -> Result<CheckScriptMode, ValidationError> {
        match (&check.override_script, &check.probe_url) {
            (Some(_), Some(_)) => Err(ValidationError::ConflictingCheckModes),
            (Some(name), None) => self.resolve_script(name).map(CheckScriptMode::OverridePath),
            (None, Some(raw)) => normalise_url(raw)
                .map(CheckScriptMode::BuiltinProbe)
                .map_err(|source| ValidationError::InvalidProbeUrl { source }),
            (None, None) => Ok(CheckScriptMode::None),
        }
    }

    fn resolve_script(&self, name: &str) -> Result<Utf8PathBuf, ValidationError> {
        let relative = Utf8Path::new(name);
        let stays_inside = relative.components().next().is_some()
            && relative
                .components()
                .all(|component| matches!(component, Utf8Component::Normal(_)));
        if stays_inside {
            Ok(self.scripts_dir.join(relative))
        } else {
            Err(ValidationError::ScriptOutsideDirectory {
                name: name.to_owned(),
                dir: self.scripts_dir.to_owned(),
            })
        }
    }
}
