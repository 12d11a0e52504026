//! `kentry [OPTIONS] TRACK_IFACE PRIORITY VIP...`
//!
//! Delegates to [`kentry::run`] with the process arguments and stdout.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    kentry::run(std::env::args_os(), io::stdout())
}
