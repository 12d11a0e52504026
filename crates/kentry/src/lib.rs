//! Container entrypoint for a keepalived VRRP instance.
//!
//! `kentry` turns a command line describing one VRRP instance into a
//! keepalived configuration file, optionally validates an operator supplied
//! check script, then launches keepalived in the foreground and supervises it:
//! its combined output is relayed line by line to stdout, termination signals
//! are forwarded to it, and its exit code becomes the container's.
//!
//! Misconfiguration is reported on stdout and answered with exit status 0 so
//! the container runtime does not restart a container that can never start.
//! See [`errors::SupervisorError::exit_code`].

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

pub mod assembler;
pub mod check_script;
mod cli;
pub mod config_file;
pub mod errors;
pub mod network;
pub mod process;
pub mod render;
mod settings;
mod supervisor;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use errors::SupervisorError;

use cli::Cli;
use network::InterfaceSource;
use process::LifecycleGuard;
use settings::SettingsLoader;
use supervisor::{SUPERVISOR_TARGET, SupervisorPlan};

/// Runs the supervisor with the process arguments, writing to `stdout`.
///
/// Returns the daemon's exit code after it exits, 0 for any problem found
/// before the daemon was launched, and 1 when the daemon could not be
/// launched or supervised.
pub fn run<I, W>(args: I, stdout: W) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    ExitCode::from(run_with_plan(args, stdout, &SupervisorPlan::system()))
}

pub(crate) fn run_with_plan<I, W, L, N>(args: I, stdout: W, plan: &SupervisorPlan<L, N>) -> u8
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    L: SettingsLoader,
    N: InterfaceSource,
{
    // Created first so every later exit path passes through its cleanup.
    let mut guard = LifecycleGuard::new(stdout);

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(usage) => {
            guard.announce(usage.render().to_string().trim_end());
            return 0;
        }
    };

    match supervisor::supervise(cli, plan, &mut guard) {
        Ok(status) => status,
        Err(failure) => {
            error!(target: SUPERVISOR_TARGET, error = %failure, "supervisor stopped");
            guard.announce(format_args!("{failure}, terminating..."));
            failure.exit_code()
        }
    }
}
