//! Installs the rendered daemon configuration.
//!
//! The owner and group are resolved before anything is written, so a typo in
//! either leaves the previous configuration untouched. The contents are
//! written atomically, then ownership and permissions are applied.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use kentry_config::Settings;
use nix::errno::Errno;
use nix::unistd::{Gid, Group, Uid, User, chown};
use tempfile::Builder;
use thiserror::Error;
use tracing::info;

const INSTALL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::config_file");

/// Errors raised while installing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigWriteError {
    /// The owning user does not exist.
    #[error("the user {name} does not exist")]
    UnknownUser {
        /// User name as configured.
        name: String,
    },
    /// The owning group does not exist.
    #[error("the group {name} does not exist")]
    UnknownGroup {
        /// Group name as configured.
        name: String,
    },
    /// The account database could not be queried.
    #[error("failed to look up {name}: {source}")]
    Lookup {
        /// Account name being resolved.
        name: String,
        /// Errno from the lookup.
        #[source]
        source: Errno,
    },
    /// The file could not be written.
    #[error("the file {path} could not be opened for writing: {source}")]
    Write {
        /// Target path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Ownership could not be changed.
    #[error("the file {path} could not be chowned: {source}")]
    Chown {
        /// Target path.
        path: Utf8PathBuf,
        /// Errno from `chown(2)`.
        #[source]
        source: Errno,
    },
    /// Permissions could not be changed.
    #[error("the file {path} could not be chmoded: {source}")]
    Chmod {
        /// Target path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Where and how the configuration file is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFileSpec<'a> {
    /// Destination path.
    pub path: &'a Utf8Path,
    /// Owning user name.
    pub owner: &'a str,
    /// Owning group name.
    pub group: &'a str,
    /// Permission bits.
    pub mode: u32,
}

impl<'a> ConfigFileSpec<'a> {
    /// Takes the destination from the supervisor settings.
    #[must_use]
    pub fn from_settings(settings: &'a Settings) -> Self {
        Self {
            path: settings.daemon_config_path(),
            owner: &settings.config_owner,
            group: &settings.config_group,
            mode: settings.config_mode,
        }
    }
}

/// Writes `contents` to the configured path with its owner, group and mode.
///
/// # Errors
///
/// Returns [`ConfigWriteError`] naming the step that failed.
pub fn install_config(spec: &ConfigFileSpec<'_>, contents: &str) -> Result<(), ConfigWriteError> {
    let uid = resolve_user(spec.owner)?;
    let gid = resolve_group(spec.group)?;

    atomic_write(spec.path, contents.as_bytes(), spec.mode).map_err(|source| {
        ConfigWriteError::Write {
            path: spec.path.to_owned(),
            source,
        }
    })?;
    chown(spec.path.as_std_path(), Some(uid), Some(gid)).map_err(|source| {
        ConfigWriteError::Chown {
            path: spec.path.to_owned(),
            source,
        }
    })?;
    fs::set_permissions(spec.path, Permissions::from_mode(spec.mode)).map_err(|source| {
        ConfigWriteError::Chmod {
            path: spec.path.to_owned(),
            source,
        }
    })?;

    let mode = format!("{:o}", spec.mode);
    info!(
        target: INSTALL_TARGET,
        path = %spec.path,
        owner = spec.owner,
        group = spec.group,
        mode = %mode,
        "daemon configuration installed"
    );
    Ok(())
}

fn resolve_user(name: &str) -> Result<Uid, ConfigWriteError> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(ConfigWriteError::UnknownUser {
            name: name.to_owned(),
        }),
        Err(source) => Err(ConfigWriteError::Lookup {
            name: name.to_owned(),
            source,
        }),
    }
}

fn resolve_group(name: &str) -> Result<Gid, ConfigWriteError> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(ConfigWriteError::UnknownGroup {
            name: name.to_owned(),
        }),
        Err(source) => Err(ConfigWriteError::Lookup {
            name: name.to_owned(),
            source,
        }),
    }
}

/// Replaces `path` with `contents` through a synced temporary file.
fn atomic_write(path: &Utf8Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;
    let directory = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };

    let mut builder = Builder::new();
    builder.prefix(path.file_name().unwrap_or("kentry"));
    builder.permissions(Permissions::from_mode(mode));

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
