//! Termination signal handling for the supervisor.
//!
//! The supervisor runs as the container's init process, so termination
//! requests arrive as signals addressed to it. [`SignalForwarder`] watches
//! for them on a dedicated thread and passes each one to a [`ChildSlot`].
//! While the daemon runs the slot forwards the signal to it, which lets the
//! daemon shut down cleanly and the relay finish normally. Before the daemon
//! exists the slot records the request so the supervisor never launches it.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{info, warn};

use super::relay::{RelayError, SupervisedProcess};
use super::{PROCESS_TARGET, pid_of};

/// Signals that request termination of the supervisor.
pub const FORWARDED_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors raised while installing the signal forwarder.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Signal handlers could not be registered.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The forwarding thread could not be started.
    #[error("failed to start the signal forwarding thread: {source}")]
    Thread {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    #[default]
    Idle,
    Running(Pid),
    ShuttingDown(i32),
}

/// Tracks the daemon's pid for the signal forwarder.
#[derive(Debug, Default)]
pub struct ChildSlot {
    state: Mutex<SlotState>,
}

impl ChildSlot {
    /// Runs `launch` unless shutdown has already been requested.
    ///
    /// The slot stays locked while the daemon starts, so a signal arriving
    /// concurrently is either seen before the launch (and the launch is
    /// skipped) or forwarded to the new daemon.
    ///
    /// # Errors
    ///
    /// Propagates the launcher's error.
    pub fn launch_with<F>(&self, launch: F) -> Result<Option<SupervisedProcess>, RelayError>
    where
        F: FnOnce() -> Result<SupervisedProcess, RelayError>,
    {
        let mut state = self.lock();
        if let SlotState::ShuttingDown(signal) = *state {
            info!(target: PROCESS_TARGET, signal, "shutdown requested before launch; daemon not started");
            return Ok(None);
        }
        let process = launch()?;
        *state = pid_of(process.pid()).map_or(SlotState::Idle, SlotState::Running);
        Ok(Some(process))
    }

    /// Handles a termination signal received by the supervisor.
    pub fn deliver(&self, signal: i32) {
        let mut state = self.lock();
        match *state {
            SlotState::Running(pid) => forward(pid, signal),
            SlotState::Idle => *state = SlotState::ShuttingDown(signal),
            SlotState::ShuttingDown(_) => {}
        }
    }

    /// Forgets the daemon's pid once it has exited.
    pub fn vacate(&self) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Running(_)) {
            *state = SlotState::Idle;
        }
    }

    /// Whether a termination signal arrived while no daemon was running.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        matches!(*self.lock(), SlotState::ShuttingDown(_))
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn forward(pid: Pid, signal: i32) {
    let Ok(forwarded) = Signal::try_from(signal) else {
        warn!(target: PROCESS_TARGET, signal, "cannot forward unknown signal");
        return;
    };
    match kill(pid, forwarded) {
        Ok(()) => info!(target: PROCESS_TARGET, %pid, signal = %forwarded, "signal forwarded to daemon"),
        Err(Errno::ESRCH) => {}
        Err(errno) => warn!(target: PROCESS_TARGET, %pid, %errno, "failed to forward signal"),
    }
}

/// Background thread relaying termination signals to a [`ChildSlot`].
///
/// Dropping the forwarder stops the thread and joins it.
#[derive(Debug)]
pub struct SignalForwarder {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    /// Registers handlers for [`FORWARDED_SIGNALS`] and starts the thread.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the handlers or the thread cannot be
    /// set up.
    pub fn install(slot: Arc<ChildSlot>) -> Result<Self, ShutdownError> {
        let mut signals =
            Signals::new(FORWARDED_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let spawned = thread::Builder::new()
            .name(String::from("signal-forwarder"))
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: PROCESS_TARGET, signal, "termination signal received");
                    slot.deliver(signal);
                }
            });
        match spawned {
            Ok(thread) => Ok(Self {
                handle,
                thread: Some(thread),
            }),
            Err(source) => {
                handle.close();
                Err(ShutdownError::Thread { source })
            }
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            warn!(target: PROCESS_TARGET, "signal forwarding thread panicked");
        }
    }
}
