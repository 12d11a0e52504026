//! `kentry-probe URL` exits 0 when the URL answers `200` and 1 otherwise.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use kentry_probe::{DEFAULT_PROBE_TIMEOUT, ProbeOutcome, normalise_url, probe};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the probe's log filter.
const LOG_ENV: &str = "KENTRY_PROBE_LOG";

/// Determine whether a URL is returning HTTP 200.
#[derive(Parser, Debug)]
#[command(name = "kentry-probe")]
struct Cli {
    /// URL to test; `http://` is assumed when no scheme is given.
    url: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .compact()
        .init();

    let url = match normalise_url(&cli.url) {
        Ok(url) => url,
        Err(error) => {
            warn!(%error, "probe URL rejected");
            return ExitCode::FAILURE;
        }
    };
    match probe(&url, DEFAULT_PROBE_TIMEOUT) {
        ProbeOutcome::Healthy => ExitCode::SUCCESS,
        ProbeOutcome::Unhealthy { reason } => {
            warn!(%url, %reason, "endpoint unhealthy");
            ExitCode::FAILURE
        }
    }
}
