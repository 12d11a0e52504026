//! Command-line surface of the supervisor.
//!
//! The arguments describe a single VRRP instance. They are parsed with
//! `try_parse_from` so usage errors and `--help` can be reported on the
//! supervisor's stdout and answered with exit status 0.

use clap::Parser;
use nix::unistd::gethostname;

use crate::assembler::{CheckRequest, InstanceRequest};

/// Router name used when neither `--router-name` nor the host name is usable.
const FALLBACK_ROUTER_NAME: &str = "kentry";

/// Run a keepalived VRRP instance configured from the command line.
#[derive(Parser, Debug)]
#[command(name = "kentry")]
pub(crate) struct Cli {
    /// Name of this VRRP instance (defaults to the host name).
    #[arg(short = 'n', long)]
    pub(crate) router_name: Option<String>,
    /// Act as the master for this VRRP instance.
    #[arg(short = 'm', long)]
    pub(crate) master: bool,
    /// Password used for VRRP authentication.
    #[arg(short = 'p', long)]
    pub(crate) auth_pass: Option<String>,
    /// Virtual router id of this instance.
    #[arg(short = 'v', long, value_parser = clap::value_parser!(u8).range(1..))]
    pub(crate) vrid: Option<u8>,
    /// Virtual IP to exclude, written ADDRESS/PREFIX/IFACE. Repeatable.
    #[arg(short = 'x', long, value_name = "VIP")]
    pub(crate) exclude: Vec<String>,
    /// Seconds between check script runs.
    #[arg(short = 'i', long, default_value_t = 2)]
    pub(crate) check_interval: u32,
    /// Successful checks required to recover from a fault.
    #[arg(short = 'r', long, default_value_t = 2)]
    pub(crate) check_rise: u32,
    /// Failed checks required to fault.
    #[arg(short = 'f', long, default_value_t = 2)]
    pub(crate) check_fall: u32,
    /// Custom check script, looked up in the scripts directory. It is run
    /// without arguments.
    #[arg(short = 'o', long, value_name = "SCRIPT", conflicts_with = "enable_check")]
    pub(crate) override_check: Option<String>,
    /// Enable the built-in check, which demotes this instance unless the URL
    /// answers HTTP 200.
    #[arg(short = 'e', long, value_name = "URL")]
    pub(crate) enable_check: Option<String>,
    /// Interface VRRP adverts are sent over.
    pub(crate) track_iface: String,
    /// Priority of this instance in the election.
    #[arg(value_parser = clap::value_parser!(u8).range(1..))]
    pub(crate) priority: u8,
    /// Virtual IPs managed by this instance, written ADDRESS/PREFIX/IFACE.
    #[arg(required = true, value_name = "VIP")]
    pub(crate) include: Vec<String>,
}

impl From<Cli> for InstanceRequest {
    fn from(cli: Cli) -> Self {
        Self {
            router_name: cli.router_name.unwrap_or_else(default_router_name),
            master: cli.master,
            auth_pass: cli.auth_pass,
            vrid: cli.vrid,
            priority: cli.priority,
            track_iface: cli.track_iface,
            include: cli.include,
            exclude: cli.exclude,
            check: CheckRequest {
                override_script: cli.override_check,
                probe_url: cli.enable_check,
                interval: cli.check_interval,
                rise: cli.check_rise,
                fall: cli.check_fall,
            },
        }
    }
}

fn default_router_name() -> String {
    gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_ROUTER_NAME.to_owned())
}
