//! Crate-level tests driving whole supervisor runs.


use std::ffi::OsString;

use camino::Utf8PathBuf;
use kentry_config::Settings;

use crate::network::HostInterfaces;
use crate::run_with_plan;
use crate::supervisor::SupervisorPlan;

fn args(line: &str) -> Vec<OsString> {
    std::iter::once("kentry")
        .chain(line.split_whitespace())
        .map(OsString::from)
        .collect()
}

fn unreachable_plan() -> SupervisorPlan<Settings, HostInterfaces> {
    SupervisorPlan {
        settings: Settings {
            daemon_binary: Utf8PathBuf::from("/nonexistent/keepalived"),
            log_filter: String::from("off"),
            ..Settings::default()
        },
        interfaces: HostInterfaces::from_names(["eth0"]),
    }
}

#[test]
fn help_is_printed_and_exits_zero() {
    let mut output = Vec::new();
    let status = run_with_plan(args("--help"), &mut output, &unreachable_plan());
    let text = String::from_utf8(output).expect("utf-8 output");
    assert_eq!(status, 0);
    assert!(text.contains("TRACK_IFACE"), "help text was {text}");
}

#[test]
fn conflicting_check_flags_exit_zero() {
    let mut output = Vec::new();
    let status = run_with_plan(
        args("-o check.sh -e haproxy eth0 100 203.0.113.0/24/eth0"),
        &mut output,
        &unreachable_plan(),
    );
    let text = String::from_utf8(output).expect("utf-8 output");
    assert_eq!(status, 0);
    assert!(text.contains("cannot be used with"), "usage text was {text}");
}
