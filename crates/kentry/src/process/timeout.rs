//! Bounded execution of one-shot commands.
//!
//! A dedicated waiter thread blocks until the child exits, without reaping
//! it, and reports over a channel. The caller waits on that channel for at
//! most the budget; if nothing arrives in time the child is sent SIGKILL.
//! Either way the child is reaped by the caller only after the verdict, and
//! the waiter thread is joined, so no zombie or stray thread outlives the
//! call.
//!
//! A command that exits just as its budget runs out is reported with its real
//! exit code: the verdict comes from the status the kernel recorded, not from
//! whether a kill was attempted.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

use super::{PROCESS_TARGET, exit_code, pid_of, program_name, wait_for_exit};

/// Errors raised while running a command under a time budget.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// The command could not be started.
    #[error("command {program} could not be started: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The command overran its budget and was killed.
    #[error("command {program} did not finish in {} seconds", .timeout.as_secs())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Process identifier of the killed child.
        pid: u32,
        /// Budget the command was given.
        timeout: Duration,
    },
    /// Waiting for the command failed.
    #[error("failed to wait for command {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The kill signal could not be delivered.
    #[error("failed to kill command {program} (pid {pid}): {source}")]
    Kill {
        /// Program that could not be killed.
        program: String,
        /// Process identifier of the child.
        pid: u32,
        /// Errno reported by `kill(2)`.
        #[source]
        source: Errno,
    },
    /// The waiter thread stopped without reporting a status.
    #[error("lost track of command {program} (pid {pid}) before it was reaped")]
    WaiterUnavailable {
        /// Program being supervised.
        program: String,
        /// Process identifier of the child.
        pid: u32,
    },
}

/// Runs `command` to completion or until `timeout` elapses.
///
/// Standard streams are whatever the caller configured on `command`.
///
/// # Errors
///
/// Returns [`TimeoutError::TimedOut`] when the command was killed after
/// overrunning its budget, [`TimeoutError::Spawn`] when it could not be
/// started, and the remaining variants when the child could not be waited on
/// or signalled.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<i32, TimeoutError> {
    let mut waiter = Waiter::launch(command)?;
    debug!(
        target: PROCESS_TARGET,
        program = %waiter.program,
        pid = waiter.pid,
        timeout_secs = timeout.as_secs(),
        "command started under time budget"
    );
    let completion = waiter.await_exit(timeout);
    waiter.join();
    match completion? {
        Completion::Exited(code) => {
            debug!(target: PROCESS_TARGET, program = %waiter.program, code, "command finished");
            Ok(code)
        }
        Completion::Killed => {
            warn!(
                target: PROCESS_TARGET,
                program = %waiter.program,
                pid = waiter.pid,
                timeout_secs = timeout.as_secs(),
                "command overran its budget and was killed"
            );
            Err(TimeoutError::TimedOut {
                program: waiter.program.clone(),
                pid: waiter.pid,
                timeout,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Exited(i32),
    Killed,
}

/// Decides how a reaped child ended.
///
/// Only a SIGKILL that this runner delivered counts as a timeout; a child
/// that was already a zombie when the signal arrived keeps its own status.
fn classify(status: ExitStatus, kill_delivered: bool) -> Completion {
    if kill_delivered && status.signal() == Some(Signal::SIGKILL as i32) {
        Completion::Killed
    } else {
        Completion::Exited(exit_code(status))
    }
}

struct Waiter {
    program: String,
    pid: u32,
    child: Child,
    exits: Receiver<nix::Result<()>>,
    thread: Option<JoinHandle<()>>,
    settled: bool,
}

impl Waiter {
    /// Spawns `command` and hands its pid to a thread that waits for it to
    /// exit. The child itself stays here and is reaped only after the
    /// verdict, so the kill never reaches a recycled pid.
    ///
    /// The thread is started first so that a failure to create it never
    /// leaves a child without anyone to wait on it.
    fn launch(command: &mut Command) -> Result<Self, TimeoutError> {
        let program = program_name(command.get_program());
        let (pid_tx, pid_rx) = mpsc::channel::<Pid>();
        let (exit_tx, exit_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(String::from("timeout-waiter"))
            .spawn(move || {
                if let Ok(pid) = pid_rx.recv() {
                    drop(exit_tx.send(wait_for_exit(pid)));
                }
            })
            .map_err(|source| TimeoutError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                drop(pid_tx);
                drop(thread.join());
                return Err(TimeoutError::Spawn { program, source });
            }
        };
        let pid = child.id();
        let handed_over = pid_of(pid).is_some_and(|target| pid_tx.send(target).is_ok());
        if !handed_over {
            drop(child.kill());
            drop(child.wait());
            drop(pid_tx);
            drop(thread.join());
            return Err(TimeoutError::WaiterUnavailable { program, pid });
        }

        Ok(Self {
            program,
            pid,
            child,
            exits: exit_rx,
            thread: Some(thread),
            settled: false,
        })
    }

    fn await_exit(&mut self, timeout: Duration) -> Result<Completion, TimeoutError> {
        match self.exits.recv_timeout(timeout) {
            Ok(exited) => {
                self.settled = true;
                self.reap(exited, false)
            }
            Err(RecvTimeoutError::Timeout) => self.settle_after_deadline(),
            Err(RecvTimeoutError::Disconnected) => {
                self.settled = true;
                Err(self.lost())
            }
        }
    }

    /// Kills the child and collects whatever status it ended with.
    fn settle_after_deadline(&mut self) -> Result<Completion, TimeoutError> {
        let target = pid_of(self.pid).ok_or_else(|| self.lost())?;
        // The child is unreaped, so the pid is still ours even if it exited.
        let delivered = match kill(target, Signal::SIGKILL) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(source) => {
                return Err(TimeoutError::Kill {
                    program: self.program.clone(),
                    pid: self.pid,
                    source,
                });
            }
        };
        let reported = self.exits.recv();
        self.settled = true;
        let exited = reported.map_err(|_| self.lost())?;
        self.reap(exited, delivered)
    }

    /// Reaps the child once the waiter has seen it exit.
    fn reap(
        &mut self,
        exited: nix::Result<()>,
        kill_delivered: bool,
    ) -> Result<Completion, TimeoutError> {
        exited.map_err(|errno| TimeoutError::Wait {
            program: self.program.clone(),
            source: io::Error::from(errno),
        })?;
        self.child
            .wait()
            .map(|status| classify(status, kill_delivered))
            .map_err(|source| TimeoutError::Wait {
                program: self.program.clone(),
                source,
            })
    }

    fn lost(&self) -> TimeoutError {
        TimeoutError::WaiterUnavailable {
            program: self.program.clone(),
            pid: self.pid,
        }
    }

    /// Joins the waiter thread once it has reported.
    ///
    /// An unsettled waiter is still blocked on a live child, so its thread
    /// is left detached rather than joined.
    fn join(&mut self) {
        if !self.settled {
            return;
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            warn!(target: PROCESS_TARGET, program = %self.program, "waiter thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rstest::rstest;

    use super::*;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[rstest]
    #[case("exit 0", 0)]
    #[case("exit 3", 3)]
    #[case("kill -TERM $$", 143)]
    fn reports_exit_code_of_finished_command(#[case] script: &str, #[case] expected: i32) {
        let code = run_with_timeout(&mut shell(script), Duration::from_secs(5))
            .expect("command finishes within budget");
        assert_eq!(code, expected);
    }

    #[test]
    fn quick_command_does_not_wait_for_the_budget() {
        let started = Instant::now();
        run_with_timeout(&mut shell("exit 0"), Duration::from_secs(30)).expect("command runs");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn overrunning_command_is_killed_and_reaped() {
        let started = Instant::now();
        let error = run_with_timeout(&mut shell("exec sleep 30"), Duration::from_secs(1))
            .expect_err("sleep overruns its budget");
        assert!(started.elapsed() < Duration::from_secs(10));
        let TimeoutError::TimedOut { pid, timeout, .. } = error else {
            panic!("expected a timeout, got {error:?}");
        };
        assert_eq!(timeout, Duration::from_secs(1));
        let reaped = pid_of(pid).expect("pid fits");
        assert_eq!(kill(reaped, None), Err(Errno::ESRCH));
    }

    #[test]
    fn timeout_message_names_command_and_budget() {
        let error = run_with_timeout(&mut shell("exec sleep 30"), Duration::from_secs(1))
            .expect_err("sleep overruns its budget");
        assert_eq!(error.to_string(), "command sh did not finish in 1 seconds");
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let mut command = Command::new("/nonexistent/kentry-check");
        let error = run_with_timeout(&mut command, Duration::from_secs(1))
            .expect_err("nothing to execute");
        assert!(matches!(error, TimeoutError::Spawn { .. }));
    }

    #[test]
    fn kill_after_natural_exit_keeps_the_real_code() {
        let mut waiter = Waiter::launch(&mut shell("exit 7")).expect("launch");
        // Let the child exit before the deadline path runs.
        thread::sleep(Duration::from_millis(500));
        let target = pid_of(waiter.pid).expect("pid fits");
        // Still a zombie: the kill below cannot land on a recycled pid.
        assert_eq!(kill(target, None), Ok(()));
        let completion = waiter.settle_after_deadline().expect("settles");
        waiter.join();
        assert_eq!(completion, Completion::Exited(7));
    }

    #[rstest]
    #[case(ExitStatus::from_raw(7 << 8), true, Completion::Exited(7))]
    #[case(ExitStatus::from_raw(9), true, Completion::Killed)]
    #[case(ExitStatus::from_raw(9), false, Completion::Exited(137))]
    fn classifies_reaped_status(
        #[case] status: ExitStatus,
        #[case] kill_delivered: bool,
        #[case] expected: Completion,
    ) {
        assert_eq!(classify(status, kill_delivered), expected);
    }
}
