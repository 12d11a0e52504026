//! Preparation and startup validation of operator supplied check scripts.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::process::Command;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::process::{TimeoutError, run_with_timeout};

const CHECK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::check_script");

/// Execute bits for user, group and other.
const EXECUTE_BITS: u32 = 0o111;

/// Errors raised while preparing or validating a check script.
#[derive(Debug, Error)]
pub enum CheckScriptError {
    /// The script path does not name a regular file.
    #[error("the provided file {path} for the override check is not a file")]
    MissingScript {
        /// Resolved script path.
        path: Utf8PathBuf,
    },
    /// The script could not be made executable.
    #[error("the file {path} could not be chmoded (returned {source})")]
    Permissions {
        /// Resolved script path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The validation run failed or overran its budget.
    #[error(transparent)]
    Run(#[from] TimeoutError),
}

/// Checks that `path` is a regular file and makes it executable.
///
/// # Errors
///
/// Returns [`CheckScriptError::MissingScript`] when the path is absent or
/// not a regular file, and [`CheckScriptError::Permissions`] when its mode
/// cannot be read or changed.
pub fn prepare_override(path: &Utf8Path) -> Result<(), CheckScriptError> {
    if !path.is_file() {
        return Err(CheckScriptError::MissingScript {
            path: path.to_owned(),
        });
    }
    let permission_error = |source| CheckScriptError::Permissions {
        path: path.to_owned(),
        source,
    };
    let mut permissions = fs::metadata(path).map_err(permission_error)?.permissions();
    permissions.set_mode(permissions.mode() | EXECUTE_BITS);
    fs::set_permissions(path, permissions).map_err(permission_error)?;
    Ok(())
}

/// Runs the script once, killing it if it overruns `timeout`.
///
/// The script inherits the supervisor's standard streams. Its exit code is
/// returned and logged but not judged: a failing check only means the
/// instance starts unhealthy.
///
/// # Errors
///
/// Returns [`CheckScriptError::Run`] when the script cannot be started or
/// does not finish in time.
pub fn validate_override(path: &Utf8Path, timeout: Duration) -> Result<i32, CheckScriptError> {
    let code = run_with_timeout(&mut Command::new(path.as_std_path()), timeout)?;
    info!(target: CHECK_TARGET, script = %path, code, "check script validated");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct ScriptsDir {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl ScriptsDir {
        fn script(&self, name: &str, body: &str) -> Utf8PathBuf {
            let path = self.root.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("chmod");
            path
        }
    }

    #[fixture]
    fn scripts() -> ScriptsDir {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        ScriptsDir { _dir: dir, root }
    }

    #[rstest]
    fn prepare_adds_execute_bits(scripts: ScriptsDir) {
        let path = scripts.script("check.sh", "exit 0");
        prepare_override(&path).expect("prepare");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o751);
    }

    #[rstest]
    fn prepare_rejects_missing_script(scripts: ScriptsDir) {
        let error = prepare_override(&scripts.root.join("absent.sh")).expect_err("missing");
        assert!(matches!(error, CheckScriptError::MissingScript { .. }));
    }

    #[rstest]
    fn prepare_rejects_directories(scripts: ScriptsDir) {
        let error = prepare_override(&scripts.root).expect_err("directory");
        assert!(matches!(error, CheckScriptError::MissingScript { .. }));
    }

    #[rstest]
    fn validation_reports_the_exit_code(scripts: ScriptsDir) {
        let path = scripts.script("failing.sh", "exit 5");
        prepare_override(&path).expect("prepare");
        let code = validate_override(&path, Duration::from_secs(5)).expect("runs");
        assert_eq!(code, 5);
    }

    #[rstest]
    fn validation_times_out(scripts: ScriptsDir) {
        let path = scripts.script("slow.sh", "exec sleep 30");
        prepare_override(&path).expect("prepare");
        let error = validate_override(&path, Duration::from_secs(1)).expect_err("too slow");
        assert!(matches!(
            error,
            CheckScriptError::Run(TimeoutError::TimedOut { .. })
        ));
    }
}
