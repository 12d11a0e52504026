//! Child process supervision.
//!
//! Two launch patterns are supported. Check scripts are one-shot commands
//! run under a wall-clock budget by [`timeout::run_with_timeout`]. The VRRP
//! daemon is long-running: [`relay::launch`] starts it with stdout and stderr
//! joined on one pipe, [`guard::LifecycleGuard`] owns it for the rest of the
//! supervisor's life and relays its output, and [`shutdown`] forwards
//! termination signals to it.

use std::ffi::OsStr;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::Pid;

pub mod guard;
pub mod relay;
pub mod shutdown;
pub mod timeout;

pub use guard::LifecycleGuard;
pub use relay::{RelayError, SupervisedProcess};
pub use shutdown::{ChildSlot, ShutdownError, SignalForwarder};
pub use timeout::{TimeoutError, run_with_timeout};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Added to the signal number when a child was terminated by a signal.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Collapses an exit status into a shell-style exit code.
///
/// Processes killed by a signal report `128 + signal`, so a daemon stopped
/// with SIGTERM yields 143.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| SIGNAL_EXIT_BASE + signal))
        .unwrap_or(SIGNAL_EXIT_BASE)
}

/// Converts a `std` child id into a `nix` pid.
pub(crate) fn pid_of(raw: u32) -> Option<Pid> {
    i32::try_from(raw).ok().map(Pid::from_raw)
}

/// Blocks until the child `pid` has exited, leaving it unreaped.
///
/// The pid stays reserved as a zombie until the caller reaps it, so signals
/// sent to it afterwards cannot reach a recycled process.
pub(crate) fn wait_for_exit(pid: Pid) -> nix::Result<()> {
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => {}
            other => return other.map(|_| ()),
        }
    }
}

pub(crate) fn program_name(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}
