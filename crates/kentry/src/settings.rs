//! Settings loading seam for the supervisor.

use std::sync::Arc;

use kentry_config::Settings;
use ortho_config::OrthoError;

/// Supplies the supervisor's settings.
pub(crate) trait SettingsLoader {
    /// Loads the settings for one run.
    fn load(&self) -> Result<Settings, Arc<OrthoError>>;
}

/// Loads settings from the configuration file and `KENTRY_*` variables.
pub(crate) struct OrthoSettingsLoader;

impl SettingsLoader for OrthoSettingsLoader {
    fn load(&self) -> Result<Settings, Arc<OrthoError>> {
        Settings::load_from_environment()
    }
}

impl SettingsLoader for Settings {
    fn load(&self) -> Result<Settings, Arc<OrthoError>> {
        Ok(self.clone())
    }
}
