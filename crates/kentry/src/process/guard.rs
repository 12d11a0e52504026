//! Scoped ownership of the supervised daemon.
//!
//! The guard is created before anything else in the supervisor so that every
//! exit path, whether an early validation failure, a relay error or a panic
//! unwinding through `run`, passes through [`LifecycleGuard::fire`]. Firing
//! is idempotent: a daemon that has already been reaped is left alone and a
//! guard with no daemon does nothing.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::relay::{RelayError, SupervisedProcess};
use super::shutdown::ChildSlot;
use super::PROCESS_TARGET;

/// Owns the supervisor's output sink and, once launched, the daemon.
#[derive(Debug)]
pub struct LifecycleGuard<W: Write> {
    sink: W,
    child: Option<SupervisedProcess>,
    slot: Option<Arc<ChildSlot>>,
}

impl<W: Write> LifecycleGuard<W> {
    /// Creates a guard with nothing to clean up yet.
    pub const fn new(sink: W) -> Self {
        Self {
            sink,
            child: None,
            slot: None,
        }
    }

    /// Ties the guard to the slot the signal forwarder consults, so the slot
    /// is vacated before the daemon's pid can be reused.
    pub fn attach_slot(&mut self, slot: Arc<ChildSlot>) {
        self.slot = Some(slot);
    }

    /// Output sink shared by supervisor messages and relayed daemon output.
    pub const fn output(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Writes one supervisor message line and flushes it.
    pub fn announce(&mut self, message: impl Display) {
        let written = writeln!(self.sink, "{message}").and_then(|()| self.sink.flush());
        if let Err(error) = written {
            warn!(target: PROCESS_TARGET, %error, "failed to write supervisor message");
        }
    }

    /// Hands the daemon to the guard. Any previously registered daemon is
    /// fired first.
    pub fn register(&mut self, process: SupervisedProcess) {
        if self.child.is_some() {
            self.fire();
        }
        debug!(target: PROCESS_TARGET, pid = process.pid(), "daemon registered with lifecycle guard");
        self.child = Some(process);
    }

    /// Whether a daemon is registered and not yet reaped.
    #[must_use]
    pub fn has_live_child(&self) -> bool {
        self.child
            .as_ref()
            .is_some_and(|process| process.exit_code().is_none())
    }

    /// Relays the registered daemon's output until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Detached`] when nothing is registered, and the
    /// relay's own errors otherwise. On error the daemon stays registered so
    /// that [`Self::fire`] can still stop it.
    pub fn relay(&mut self) -> Result<i32, RelayError> {
        let process = self.child.as_mut().ok_or(RelayError::Detached)?;
        process.forward_output(&mut self.sink)?;
        // Signals keep reaching the daemon until it has actually exited.
        process.wait_exited()?;
        vacate(self.slot.as_deref());
        process.reap()
    }

    /// Stops the registered daemon if it is still running.
    ///
    /// Sends SIGTERM, relays whatever the daemon prints while shutting down
    /// and reaps it. Returns the daemon's exit code when this call stopped
    /// it, or `None` when there was nothing left to do.
    pub fn fire(&mut self) -> Option<i32> {
        let mut process = self.child.take()?;
        if process.exit_code().is_some() {
            vacate(self.slot.as_deref());
            return None;
        }
        info!(
            target: PROCESS_TARGET,
            program = process.program(),
            pid = process.pid(),
            "terminating daemon"
        );
        if let Err(errno) = process.terminate() {
            warn!(target: PROCESS_TARGET, pid = process.pid(), %errno, "failed to signal daemon");
        }
        if let Err(error) = process.forward_output(&mut self.sink) {
            warn!(target: PROCESS_TARGET, %error, "failed to relay output during shutdown");
            // Keep the pipe empty so a chatty daemon can still exit.
            if let Err(discard) = process.forward_output(&mut io::sink()) {
                warn!(target: PROCESS_TARGET, error = %discard, "failed to drain daemon output");
            }
        }
        if let Err(error) = process.wait_exited() {
            warn!(target: PROCESS_TARGET, %error, "failed to wait for daemon exit");
        }
        vacate(self.slot.as_deref());
        match process.reap() {
            Ok(code) => {
                info!(target: PROCESS_TARGET, code, "daemon stopped");
                Some(code)
            }
            Err(error) => {
                warn!(target: PROCESS_TARGET, %error, "failed to reap daemon");
                None
            }
        }
    }
}

impl<W: Write> Drop for LifecycleGuard<W> {
    fn drop(&mut self) {
        if let Some(code) = self.fire() {
            debug!(target: PROCESS_TARGET, code, "lifecycle guard stopped daemon on drop");
        }
    }
}

fn vacate(slot: Option<&ChildSlot>) {
    if let Some(active) = slot {
        active.vacate();
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use signal_hook::consts::signal::SIGTERM;

    use super::*;
    use crate::process::{pid_of, relay};

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn daemon(script: &str) -> SupervisedProcess {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        relay::launch(command).expect("launch")
    }

    #[test]
    fn empty_guard_fires_as_a_no_op() {
        let mut sink = Vec::new();
        let mut guard = LifecycleGuard::new(&mut sink);
        assert_eq!(guard.fire(), None);
        assert_eq!(guard.fire(), None);
        drop(guard);
        assert!(sink.is_empty());
    }

    #[test]
    fn fire_terminates_a_live_daemon_exactly_once() {
        let mut sink = Vec::new();
        let mut guard = LifecycleGuard::new(&mut sink);
        let process = daemon("trap 'echo stopping; exit 0' TERM; echo ready; while :; do sleep 1; done");
        let pid = pid_of(process.pid()).expect("pid fits");
        guard.register(process);
        assert!(guard.has_live_child());

        // Give the shell time to install its trap.
        thread::sleep(Duration::from_millis(300));
        assert_eq!(guard.fire(), Some(0));
        assert_eq!(guard.fire(), None);
        assert!(!guard.has_live_child());
        drop(guard);

        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
        let output = String::from_utf8(sink).expect("utf8 output");
        assert!(output.contains("ready"));
        assert!(output.contains("stopping"));
    }

    #[test]
    fn drop_stops_an_unrelayed_daemon() {
        let process = daemon("exec sleep 30");
        let pid = pid_of(process.pid()).expect("pid fits");
        {
            let mut guard = LifecycleGuard::new(Vec::new());
            guard.register(process);
        }
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn relayed_daemon_is_not_fired_again() {
        let mut sink = Vec::new();
        let mut guard = LifecycleGuard::new(&mut sink);
        guard.register(daemon("echo done; exit 5"));
        assert_eq!(guard.relay().expect("relay"), 5);
        assert_eq!(guard.fire(), None);
        drop(guard);
        assert_eq!(sink, b"done\n");
    }

    #[test]
    fn relay_without_daemon_is_detached() {
        let mut guard = LifecycleGuard::new(Vec::new());
        assert!(matches!(guard.relay(), Err(RelayError::Detached)));
    }

    #[test]
    fn announce_writes_a_line() {
        let mut sink = Vec::new();
        let mut guard = LifecycleGuard::new(&mut sink);
        guard.announce("WARNING: defaulting");
        drop(guard);
        assert_eq!(sink, b"WARNING: defaulting\n");
    }

    #[test]
    fn signal_reaches_a_daemon_that_closed_its_output() {
        let slot = Arc::new(ChildSlot::default());
        let process = slot
            .launch_with(|| Ok(daemon("exec >/dev/null 2>&1; exec sleep 30")))
            .expect("launch")
            .expect("no shutdown pending");
        let mut guard = LifecycleGuard::new(Vec::new());
        guard.attach_slot(Arc::clone(&slot));
        guard.register(process);

        let stopper = Arc::clone(&slot);
        let signaller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            stopper.deliver(SIGTERM);
        });
        let started = Instant::now();
        assert_eq!(guard.relay().expect("relay"), 128 + SIGTERM);
        signaller.join().expect("signaller thread");

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!slot.shutdown_requested());
    }

    #[test]
    fn fire_drains_a_chatty_daemon_after_the_sink_breaks() {
        let mut guard = LifecycleGuard::new(BrokenSink);
        guard.register(daemon(
            "trap 'i=0; while [ $i -lt 20000 ]; do echo draining-the-pipe-buffer; i=$((i+1)); done; exit 0' TERM; \
             echo ready; while :; do sleep 1; done",
        ));
        // Give the shell time to install its trap.
        thread::sleep(Duration::from_millis(300));
        assert_eq!(guard.fire(), Some(0));
    }
}
