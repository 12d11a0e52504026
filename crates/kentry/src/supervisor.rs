//! One supervisor run, from a parsed command line to the daemon's exit.

use std::io::Write;
use std::process::Command;
use std::sync::Arc;

use kentry_config::Settings;
use tracing::{debug, info, warn};

use crate::assembler::{CheckScriptMode, ConfigAssembler, InstanceRequest};
use crate::check_script::{prepare_override, validate_override};
use crate::cli::Cli;
use crate::config_file::{ConfigFileSpec, install_config};
use crate::errors::SupervisorError;
use crate::network::{InterfaceSource, SystemInterfaces};
use crate::process::{ChildSlot, LifecycleGuard, SignalForwarder, relay};
use crate::render::ConfigRenderer;
use crate::settings::{OrthoSettingsLoader, SettingsLoader};
use crate::telemetry;

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Arguments keeping the daemon in the foreground and logging to its stdout.
const DAEMON_ARGS: [&str; 2] = ["--dont-fork", "--log-console"];

/// Exit status reported when the daemon's code does not fit a byte.
const UNREPRESENTABLE_EXIT: u8 = 1;

/// Collaborators the supervisor consults for settings and host state.
pub(crate) struct SupervisorPlan<L, N> {
    pub(crate) settings: L,
    pub(crate) interfaces: N,
}

impl SupervisorPlan<OrthoSettingsLoader, SystemInterfaces> {
    /// Reads settings from the environment and interfaces from the kernel.
    pub(crate) const fn system() -> Self {
        Self {
            settings: OrthoSettingsLoader,
            interfaces: SystemInterfaces,
        }
    }
}

/// Runs everything after argument parsing and returns the exit status.
///
/// Pre-launch steps run in order: settings, telemetry, signal handling,
/// interface discovery, assembly, rendering, installation and check script
/// validation. The daemon is then launched into `guard`, which relays its
/// output until it exits.
pub(crate) fn supervise<L, N, W>(
    cli: Cli,
    plan: &SupervisorPlan<L, N>,
    guard: &mut LifecycleGuard<W>,
) -> Result<u8, SupervisorError>
where
    L: SettingsLoader,
    N: InterfaceSource,
    W: Write,
{
    let settings = plan
        .settings
        .load()
        .map_err(|source| SupervisorError::Settings { source })?;
    telemetry::initialise(&settings)?;

    let slot = Arc::new(ChildSlot::default());
    let _forwarder = SignalForwarder::install(Arc::clone(&slot))?;
    guard.attach_slot(Arc::clone(&slot));

    let interfaces = plan.interfaces.interfaces()?;
    debug!(
        target: SUPERVISOR_TARGET,
        interfaces = ?interfaces.names().collect::<Vec<_>>(),
        "host interfaces discovered"
    );
    let request = InstanceRequest::from(cli);
    let assembly = ConfigAssembler::new(
        &interfaces,
        settings.scripts_dir(),
        settings.probe_executable(),
    )
    .assemble(&request)?;
    let context = &assembly.context;
    let vips = context.virtual_ipaddresses();
    let included = vips.iter().filter(|vip| vip.included()).count();
    info!(
        target: SUPERVISOR_TARGET,
        router = context.router_name(),
        priority = context.priority(),
        included,
        excluded = vips.len() - included,
        "VRRP instance assembled"
    );
    for warning in &assembly.warnings {
        warn!(target: SUPERVISOR_TARGET, ?warning, "insecure default applied");
        guard.announce(warning);
    }

    let rendered =
        ConfigRenderer::new(settings.template_dir()).render(&settings.template_name, context)?;
    install_config(&ConfigFileSpec::from_settings(&settings), &rendered)?;

    if let CheckScriptMode::OverridePath(script) = &assembly.check_mode {
        prepare_override(script)?;
        validate_override(script, settings.check_timeout())?;
    }

    if let Err(error) = guard.output().flush() {
        warn!(target: SUPERVISOR_TARGET, %error, "failed to flush supervisor output");
    }
    let command = daemon_command(&settings);
    let launched = slot
        .launch_with(|| relay::launch(command))
        .map_err(|source| SupervisorError::Launch { source })?;
    let Some(process) = launched else {
        info!(target: SUPERVISOR_TARGET, "shutdown requested before launch");
        return Ok(0);
    };
    guard.register(process);

    let code = guard
        .relay()
        .map_err(|source| SupervisorError::Relay { source })?;
    info!(target: SUPERVISOR_TARGET, code, "daemon exited");
    Ok(u8::try_from(code).unwrap_or(UNREPRESENTABLE_EXIT))
}

fn daemon_command(settings: &Settings) -> Command {
    let mut command = Command::new(settings.daemon_binary().as_std_path());
    command.args(DAEMON_ARGS);
    command
}
