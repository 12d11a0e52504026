//! Termination signals received by the supervisor reach the daemon.
//!
//! Raising a real signal affects every forwarder installed in the process,
//! so this file holds a single test and runs as its own test binary.

use std::process::Command;
use std::sync::Arc;

use kentry::process::{ChildSlot, SignalForwarder, relay};
use nix::sys::signal::{Signal, raise};

#[test]
fn raised_sigterm_is_forwarded_to_the_daemon() {
    let slot = Arc::new(ChildSlot::default());
    let forwarder = SignalForwarder::install(Arc::clone(&slot)).expect("install forwarder");
    let mut process = slot
        .launch_with(|| {
            let mut command = Command::new("sh");
            command.args(["-c", "exec sleep 30"]);
            relay::launch(command)
        })
        .expect("launch")
        .expect("no shutdown pending");

    raise(Signal::SIGTERM).expect("raise SIGTERM");

    let mut sink = Vec::new();
    let code = relay::relay(&mut process, &mut sink).expect("relay");
    assert_eq!(code, 128 + Signal::SIGTERM as i32);
    assert!(!slot.shutdown_requested());
    drop(forwarder);
}
