//! Unified error surface of the supervisor and its exit-code policy.
//!
//! A misconfigured container should stay down rather than be restarted in a
//! loop by the runtime, so every failure detected before the daemon is
//! launched exits 0. Only failures to launch or relay the daemon itself
//! exit 1.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::assembler::ValidationError;
use crate::check_script::CheckScriptError;
use crate::config_file::ConfigWriteError;
use crate::network::InterfaceError;
use crate::process::{RelayError, ShutdownError};
use crate::render::TemplateError;
use crate::telemetry::TelemetryError;

/// Errors that end a supervisor run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Settings failed to load.
    #[error("failed to load settings: {source}")]
    Settings {
        /// Loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Termination signal handling could not be installed.
    #[error(transparent)]
    Signals(#[from] ShutdownError),
    /// Host interfaces could not be listed.
    #[error(transparent)]
    Interfaces(#[from] InterfaceError),
    /// The instance request is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The configuration template failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// The configuration file could not be installed.
    #[error(transparent)]
    ConfigWrite(#[from] ConfigWriteError),
    /// The override check script failed preparation or validation.
    #[error(transparent)]
    CheckScript(#[from] CheckScriptError),
    /// The daemon could not be launched.
    #[error("daemon launch failed: {source}")]
    Launch {
        /// Launch error.
        #[source]
        source: RelayError,
    },
    /// The daemon's output could not be relayed.
    #[error("daemon supervision failed: {source}")]
    Relay {
        /// Relay error.
        #[source]
        source: RelayError,
    },
}

impl SupervisorError {
    /// Exit status the supervisor reports for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Launch { .. } | Self::Relay { .. } => 1,
            _ => 0,
        }
    }
}
