use std::process::Command;

use anyhow::{Context, Result};
use vzupgrade_core::{CommandRunner, CommandStatus, UpgradeOptions};

pub const ENGINE_PROGRAM: &str = "leapp";

/// Environment switch read by the engine's virtualization-specific actors.
pub const SKIP_VZ_ENV: &str = "SKIPVZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Inventory and report only.
    DryRun,
    Upgrade,
}

impl EngineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "preupgrade",
            Self::Upgrade => "upgrade",
        }
    }
}

pub fn build_engine_command(options: &UpgradeOptions, mode: EngineMode) -> Command {
    let mut command = Command::new(ENGINE_PROGRAM);
    command.args([mode.as_str(), "--no-rhsm"]);
    for repo in options
        .release
        .repo_ids()
        .iter()
        .chain(options.enable_repos.iter())
    {
        command.arg(format!("--enablerepo={repo}"));
    }
    if let Some(flag) = options.verbosity.engine_flag() {
        command.arg(flag);
    }

    if options.skip_vz {
        command.env(SKIP_VZ_ENV, "1");
    } else {
        command.env_remove(SKIP_VZ_ENV);
    }
    command
}

pub fn run_engine(
    options: &UpgradeOptions,
    mode: EngineMode,
    runner: &mut dyn CommandRunner,
) -> Result<CommandStatus> {
    let mut command = build_engine_command(options, mode);
    tracing::info!(mode = mode.as_str(), release = options.release.as_str(), "starting upgrade engine");
    let status = runner
        .run(&mut command)
        .with_context(|| format!("failed to start {ENGINE_PROGRAM} {}", mode.as_str()))?;
    if status.success() {
        tracing::info!(mode = mode.as_str(), "upgrade engine finished");
    } else {
        tracing::error!(mode = mode.as_str(), %status, "upgrade engine failed");
    }
    Ok(status)
}

/// Reboots into the upgrade environment. On a real host this does not
/// return.
pub fn reboot_host(runner: &mut dyn CommandRunner) -> Result<()> {
    tracing::info!("rebooting to continue the upgrade");
    runner
        .replace_process(&mut Command::new("reboot"))
        .context("failed to reboot the host")
}
