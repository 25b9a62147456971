//! Sequencing of the `check` and `install` flows.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use vzupgrade_core::{CommandRunner, CommandStatus};

use crate::blockers::{run_gate, BlockerCheck, GateReport};
use crate::engine::{reboot_host, run_engine, EngineMode};
use crate::fs_utils::remove_file_if_exists;
use crate::guests::{quiesce_guests, GuestControl, QuiesceReport};
use crate::hooks::{run_hooks, HookOutcome};
use crate::prepare::{prepare_files, PrepareReport};
use crate::snapshot::{capture_snapshot, SnapshotReport};
use crate::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PrepareFiles,
    PrecheckHooks,
    Blockers,
    PreinstallHooks,
    RpmLocks,
    Snapshot,
    QuiesceGuests,
    Engine(EngineMode),
    Reboot,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::PrepareFiles => "preparing host files",
            Self::PrecheckHooks => "running precheck hooks",
            Self::Blockers => "checking upgrade blockers",
            Self::PreinstallHooks => "running preinstall hooks",
            Self::RpmLocks => "clearing rpm database locks",
            Self::Snapshot => "saving host configuration",
            Self::QuiesceGuests => "stopping virtual environments",
            Self::Engine(EngineMode::DryRun) => "running upgrade pre-check",
            Self::Engine(EngineMode::Upgrade) => "running upgrade",
            Self::Reboot => "rebooting",
        }
    }

    /// Phases whose subprocesses write straight to the terminal.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            Self::PrecheckHooks | Self::PreinstallHooks | Self::Engine(_) | Self::Reboot
        )
    }
}

pub trait PhaseObserver {
    fn phase_started(&mut self, _phase: Phase) {}

    fn phase_finished(&mut self, _phase: Phase, _ok: bool) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl PhaseObserver for SilentObserver {}

/// External collaborators for one run.
pub struct HostServices<'a> {
    pub runner: &'a mut dyn CommandRunner,
    pub guests: &'a mut dyn GuestControl,
    pub checks: Vec<Box<dyn BlockerCheck>>,
    pub observer: &'a mut dyn PhaseObserver,
}

impl HostServices<'_> {
    fn step<T>(&mut self, phase: Phase, run: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        tracing::info!(phase = phase.label(), "phase started");
        self.observer.phase_started(phase);
        let result = run(self);
        self.observer.phase_finished(phase, result.is_ok());
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub prepare: PrepareReport,
    pub hooks: Vec<HookOutcome>,
    pub gate: GateReport,
    /// `None` with `--blocker` or when blockers stopped the run.
    pub dry_run: Option<CommandStatus>,
}

impl CheckOutcome {
    pub fn succeeded(&self) -> bool {
        self.gate.passed() && self.dry_run.map_or(true, CommandStatus::success)
    }

    pub fn exit_code(&self) -> u8 {
        u8::from(!self.succeeded())
    }
}

pub fn run_check(
    ctx: &RunContext,
    blockers_only: bool,
    services: &mut HostServices<'_>,
) -> Result<CheckOutcome> {
    let prepare = services.step(Phase::PrepareFiles, |_| prepare_files(ctx))?;
    let hook_dir = ctx.layout.resolve(&ctx.settings.precheck_hooks_dir);
    let hooks = services.step(Phase::PrecheckHooks, |s| Ok(run_hooks(&hook_dir, s.runner)))?;
    let gate = services.step(Phase::Blockers, |s| Ok(evaluate_gate(ctx, s)))?;

    let mut outcome = CheckOutcome {
        prepare,
        hooks,
        gate,
        dry_run: None,
    };
    if blockers_only || !outcome.gate.passed() {
        return Ok(outcome);
    }

    let status = services.step(Phase::Engine(EngineMode::DryRun), |s| {
        run_engine(&ctx.options, EngineMode::DryRun, s.runner)
    })?;
    outcome.dry_run = Some(status);
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Blocked(GateReport),
    Upgraded(InstallReport),
    /// Only observable with a runner that does not really exec.
    RebootIssued(InstallReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub prepare: PrepareReport,
    pub gate: GateReport,
    pub hooks: Vec<HookOutcome>,
    pub removed_rpm_locks: Vec<PathBuf>,
    pub snapshot: SnapshotReport,
    /// `None` with `--skip-vz`.
    pub quiesce: Option<QuiesceReport>,
}

pub fn run_install(ctx: &RunContext, services: &mut HostServices<'_>) -> Result<InstallOutcome> {
    let prepare = services.step(Phase::PrepareFiles, |_| prepare_files(ctx))?;
    let gate = services.step(Phase::Blockers, |s| Ok(evaluate_gate(ctx, s)))?;
    if !gate.passed() {
        return Ok(InstallOutcome::Blocked(gate));
    }

    let hook_dir = ctx.layout.resolve(&ctx.settings.preinstall_hooks_dir);
    let hooks = services.step(Phase::PreinstallHooks, |s| Ok(run_hooks(&hook_dir, s.runner)))?;
    let removed_rpm_locks = services.step(Phase::RpmLocks, |_| Ok(clear_rpm_locks(ctx)))?;
    let snapshot = services.step(Phase::Snapshot, |s| Ok(capture_snapshot(ctx, s.runner)))?;

    let quiesce = if ctx.options.skip_vz {
        tracing::info!("virtualization processing skipped, guests left as they are");
        None
    } else {
        Some(services.step(Phase::QuiesceGuests, |s| quiesce_guests(s.guests))?)
    };

    let status = services.step(Phase::Engine(EngineMode::Upgrade), |s| {
        run_engine(&ctx.options, EngineMode::Upgrade, s.runner)
    })?;
    if !status.success() {
        return Err(anyhow!(
            "upgrade engine failed ({status}); host configuration was saved to {}",
            ctx.layout.snapshot_dir().display()
        ));
    }

    let report = InstallReport {
        prepare,
        gate,
        hooks,
        removed_rpm_locks,
        snapshot,
        quiesce,
    };
    if !ctx.options.reboot {
        return Ok(InstallOutcome::Upgraded(report));
    }

    services.step(Phase::Reboot, |s| reboot_host(s.runner))?;
    Ok(InstallOutcome::RebootIssued(report))
}

fn evaluate_gate(ctx: &RunContext, services: &mut HostServices<'_>) -> GateReport {
    run_gate(&services.checks, &ctx.options, services.runner)
}

/// Stale Berkeley DB environment files can wedge the package transaction.
/// Removal is best effort.
fn clear_rpm_locks(ctx: &RunContext) -> Vec<PathBuf> {
    let dir = ctx.layout.rpm_db_dir();
    let entries = match fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display())) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "skipping rpm lock cleanup");
            return Vec::new();
        }
    };

    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_lock = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("__db"));
        if !is_lock {
            continue;
        }
        match remove_file_if_exists(&path) {
            Ok(true) => removed.push(path),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove rpm lock"),
        }
    }
    removed
}
