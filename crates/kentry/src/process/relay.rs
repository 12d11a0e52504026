//! Launching the daemon and relaying its output.
//!
//! The daemon's stdout and stderr share one pipe so the container log shows
//! its lines in the order they were written. Lines are forwarded byte for
//! byte and the sink is flushed after each one.

use std::io::{self, BufRead, BufReader, PipeReader, Write};
use std::process::{Child, Command};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use thiserror::Error;
use tracing::{debug, info};

use super::{PROCESS_TARGET, exit_code, pid_of, program_name, wait_for_exit};

/// Errors raised while launching or relaying the daemon.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The combined output pipe could not be created.
    #[error("failed to create the output pipe for {program}: {source}")]
    Pipe {
        /// Program being launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The daemon could not be started.
    #[error("failed to launch {program}: {source}")]
    LaunchFailed {
        /// Program being launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading the daemon's output or writing it to the sink failed.
    #[error("failed to relay output of {program}: {source}")]
    Io {
        /// Program whose output was being relayed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The daemon could not be reaped.
    #[error("failed to wait for {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Relay was requested before any daemon was registered.
    #[error("no daemon is registered for relaying")]
    Detached,
}

/// A launched daemon and the read end of its combined output.
#[derive(Debug)]
pub struct SupervisedProcess {
    program: String,
    child: Child,
    output: BufReader<PipeReader>,
    exit_code: Option<i32>,
}

impl SupervisedProcess {
    /// Process identifier of the daemon.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Program the daemon was started from.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code recorded once the daemon has been reaped.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Copies the daemon's output to `sink` until end-of-stream.
    pub(crate) fn forward_output<W: Write>(&mut self, sink: &mut W) -> Result<u64, RelayError> {
        forward_lines(&mut self.output, sink).map_err(|source| RelayError::Io {
            program: self.program.clone(),
            source,
        })
    }

    /// Asks the daemon to stop. A daemon that has already exited is ignored.
    pub(crate) fn terminate(&self) -> Result<(), Errno> {
        let Some(pid) = pid_of(self.child.id()) else {
            return Ok(());
        };
        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno),
        }
    }

    /// Blocks until the daemon has exited without reaping it.
    ///
    /// A daemon can close its output long before it exits, so end-of-stream
    /// alone does not mean its pid may be forgotten.
    pub(crate) fn wait_exited(&self) -> Result<(), RelayError> {
        if self.exit_code.is_some() {
            return Ok(());
        }
        let Some(pid) = pid_of(self.child.id()) else {
            return Ok(());
        };
        wait_for_exit(pid).map_err(|errno| RelayError::Wait {
            program: self.program.clone(),
            source: io::Error::from(errno),
        })
    }

    /// Waits for the daemon to exit, recording its code the first time.
    pub(crate) fn reap(&mut self) -> Result<i32, RelayError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait().map_err(|source| RelayError::Wait {
            program: self.program.clone(),
            source,
        })?;
        let code = exit_code(status);
        self.exit_code = Some(code);
        Ok(code)
    }
}

/// Starts `command` with stdout and stderr joined on a single pipe.
///
/// The command is consumed so the parent's copies of the write end are
/// closed as soon as the child is running; otherwise the relay would never
/// see end-of-stream.
///
/// # Errors
///
/// Returns [`RelayError::Pipe`] when the pipe cannot be created and
/// [`RelayError::LaunchFailed`] when the program cannot be executed.
pub fn launch(mut command: Command) -> Result<SupervisedProcess, RelayError> {
    let program = program_name(command.get_program());
    let pipe_error = |source| RelayError::Pipe {
        program: program.clone(),
        source,
    };
    let (reader, writer) = io::pipe().map_err(pipe_error)?;
    let error_writer = writer.try_clone().map_err(pipe_error)?;
    command.stdout(writer).stderr(error_writer);
    let spawned = command.spawn();
    drop(command);
    let child = spawned.map_err(|source| RelayError::LaunchFailed {
        program: program.clone(),
        source,
    })?;
    info!(target: PROCESS_TARGET, program = %program, pid = child.id(), "daemon launched");
    Ok(SupervisedProcess {
        program,
        child,
        output: BufReader::new(reader),
        exit_code: None,
    })
}

/// Relays the daemon's output to `sink` and returns its exit code.
///
/// # Errors
///
/// Returns [`RelayError::Io`] when the output cannot be read or written and
/// [`RelayError::Wait`] when the daemon cannot be reaped. The daemon is left
/// running on error; [`super::LifecycleGuard`] is responsible for it.
pub fn relay<W: Write>(process: &mut SupervisedProcess, sink: &mut W) -> Result<i32, RelayError> {
    let lines = process.forward_output(sink)?;
    debug!(target: PROCESS_TARGET, program = %process.program, lines, "daemon output closed");
    process.reap()
}

/// Copies newline-terminated chunks from `reader` to `sink`, flushing each.
///
/// A trailing chunk without a newline is forwarded as-is.
pub(crate) fn forward_lines<R: BufRead, W: Write>(reader: &mut R, sink: &mut W) -> io::Result<u64> {
    let mut line = Vec::new();
    let mut forwarded = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(forwarded);
        }
        sink.write_all(&line)?;
        sink.flush()?;
        forwarded += 1;
    }
}
