//! Upgrade blockers and the gate that aggregates them.
//!
//! Every registered check runs on every invocation, even after an earlier
//! one failed, so the operator sees the full list of problems at once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::Serialize;
use vzupgrade_core::{capture_stdout, CommandRunner, UpgradeOptions};

use crate::RunContext;

/// Bumped whenever a check is added, removed or changes its verdict rules.
pub const BLOCKER_SET_VERSION: u32 = 2;

const YUM_UPDATES_AVAILABLE: i32 = 100;

const SUPPORTED_TEMPLATES: &[&str] = &[
    "centos-7-x86_64",
    "centos-8-x86_64",
    "debian-10.0-x86_64",
    "debian-9.0-x86_64",
    "debian-8.0-x86_64",
    "debian-7.0-x86_64",
    "ubuntu-18.04-x86_64",
    "ubuntu-18.10-x86_64",
    "ubuntu-19.04-x86_64",
    "ubuntu-19.10-x86_64",
    "ubuntu-20.04-x86_64",
    "ubuntu-20.10-x86_64",
    "ubuntu-21.04-x86_64",
    "ubuntu-21.10-x86_64",
    "sles-11-x86_64",
    "sles-12-x86_64",
    "sles-15-x86_64",
    "vzlinux-7-x86_64",
    "vzlinux-8-x86_64",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Vec<String>),
    /// Worth telling the operator about, never blocks.
    Informational(Vec<String>),
}

pub trait BlockerCheck {
    fn name(&self) -> &'static str;

    /// One-line prerequisite shown by `vzupgrade list`.
    fn description(&self) -> String;

    fn applies(&self, _options: &UpgradeOptions) -> bool {
        true
    }

    fn evaluate(&self, runner: &mut dyn CommandRunner) -> Result<Verdict>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Blocker,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub kind: FindingKind,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub version: u32,
    pub aggregate: u32,
    pub findings: Vec<Finding>,
    pub skipped: Vec<&'static str>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.aggregate == 0
    }

    pub fn blockers(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|finding| finding.kind == FindingKind::Blocker)
    }

    pub fn diagnostics(&self) -> Vec<&str> {
        self.blockers()
            .flat_map(|finding| finding.messages.iter().map(String::as_str))
            .collect()
    }
}

pub fn run_gate(
    checks: &[Box<dyn BlockerCheck>],
    options: &UpgradeOptions,
    runner: &mut dyn CommandRunner,
) -> GateReport {
    let mut report = GateReport {
        version: BLOCKER_SET_VERSION,
        aggregate: 0,
        findings: Vec::new(),
        skipped: Vec::new(),
    };

    for check in checks {
        if !check.applies(options) {
            tracing::debug!(check = check.name(), "check skipped");
            report.skipped.push(check.name());
            continue;
        }

        let verdict = check.evaluate(runner).unwrap_or_else(|err| {
            Verdict::Fail(vec![format!(
                "INPLACERISK: EXTREME: could not evaluate {}: {err:#}",
                check.name()
            )])
        });

        match verdict {
            Verdict::Pass => tracing::debug!(check = check.name(), "check passed"),
            Verdict::Fail(messages) => {
                tracing::info!(check = check.name(), "blocker found");
                report.aggregate += 1;
                report.findings.push(Finding {
                    check: check.name(),
                    kind: FindingKind::Blocker,
                    messages,
                });
            }
            Verdict::Informational(messages) => {
                report.findings.push(Finding {
                    check: check.name(),
                    kind: FindingKind::Info,
                    messages,
                });
            }
        }
    }

    tracing::info!(aggregate = report.aggregate, "blocker gate evaluated");
    report
}

pub type FreeSpaceReader = fn(&Path) -> Result<u64>;

pub fn standard_checks(ctx: &RunContext) -> Vec<Box<dyn BlockerCheck>> {
    standard_checks_with_space_reader(ctx, available_bytes)
}

pub fn standard_checks_with_space_reader(
    ctx: &RunContext,
    read_free_space: FreeSpaceReader,
) -> Vec<Box<dyn BlockerCheck>> {
    let mut supported = SUPPORTED_TEMPLATES
        .iter()
        .map(|template| template.to_string())
        .collect::<Vec<_>>();
    supported.extend(ctx.settings.extra_supported_templates.iter().cloned());

    vec![
        Box::new(PendingUpdates),
        Box::new(ContainerTemplates { supported }),
        Box::new(FreeSpace {
            display_path: ctx.settings.free_space_path.clone(),
            path: ctx.layout.resolve(&ctx.settings.free_space_path),
            min_free_gb: ctx.settings.min_free_gb,
            read_free_space,
        }),
        Box::new(ManagementAgents {
            units: ctx.settings.incompatible_agent_units.clone(),
        }),
        Box::new(AutomationPackages),
    ]
}

pub fn available_bytes(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("failed to stat filesystem at {}", path.display()))?;
    Ok((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
}

pub struct PendingUpdates;

impl BlockerCheck for PendingUpdates {
    fn name(&self) -> &'static str {
        "pending-updates"
    }

    fn description(&self) -> String {
        "All updates are installed".to_string()
    }

    fn evaluate(&self, runner: &mut dyn CommandRunner) -> Result<Verdict> {
        let mut command = Command::new("yum");
        command.args(["check-update", "-q"]);
        let output = runner
            .capture(&mut command)
            .context("failed to query pending updates")?;

        Ok(match output.status.code() {
            Some(0) => Verdict::Pass,
            Some(YUM_UPDATES_AVAILABLE) => Verdict::Fail(vec![
                "INPLACERISK: EXTREME: You have updates available! Please install all updates first"
                    .to_string(),
            ]),
            _ => Verdict::Fail(vec![format!(
                "INPLACERISK: EXTREME: Unable to query pending updates ({}); make sure yum works and all updates are installed",
                output.status
            )]),
        })
    }
}

pub struct ContainerTemplates {
    supported: Vec<String>,
}

impl BlockerCheck for ContainerTemplates {
    fn name(&self) -> &'static str {
        "container-templates"
    }

    fn description(&self) -> String {
        "There are no containers based on OS templates unsupported by the target release"
            .to_string()
    }

    fn applies(&self, options: &UpgradeOptions) -> bool {
        !options.skip_vz
    }

    fn evaluate(&self, runner: &mut dyn CommandRunner) -> Result<Verdict> {
        let mut list = Command::new("vzlist");
        list.args(["-o", "ctid", "-a", "-H"]);
        let ctids = capture_stdout(runner, &mut list, "failed to list containers")?;

        let mut unsupported: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ctid in ctids.lines().map(str::trim).filter(|ctid| !ctid.is_empty()) {
            let mut query = Command::new("vzpkg");
            query.args(["list", ctid, "--os"]);
            let raw = capture_stdout(
                runner,
                &mut query,
                &format!("failed to resolve OS template of container {ctid}"),
            )?;
            let template = raw.split_whitespace().next().unwrap_or("unknown");
            if !self.supported.iter().any(|known| known == template) {
                unsupported
                    .entry(template.to_string())
                    .or_default()
                    .push(ctid.to_string());
            }
        }

        if unsupported.is_empty() {
            return Ok(Verdict::Pass);
        }

        let grouped = unsupported
            .iter()
            .map(|(template, ctids)| format!("{template} ({})", ctids.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Verdict::Fail(vec![format!(
            "Containers found that use templates not supported by the target release: {grouped}"
        )]))
    }
}

pub struct FreeSpace {
    display_path: PathBuf,
    path: PathBuf,
    min_free_gb: u64,
    read_free_space: FreeSpaceReader,
}

impl BlockerCheck for FreeSpace {
    fn name(&self) -> &'static str {
        "free-space"
    }

    fn description(&self) -> String {
        format!(
            "At least {} GB of free space is available in {}",
            self.min_free_gb,
            self.display_path.display()
        )
    }

    fn evaluate(&self, _runner: &mut dyn CommandRunner) -> Result<Verdict> {
        let available = (self.read_free_space)(&self.path)?;
        let required = self.min_free_gb.saturating_mul(1024 * 1024 * 1024);
        if available >= required {
            return Ok(Verdict::Pass);
        }

        let available_gb = available as f64 / (1024.0 * 1024.0 * 1024.0);
        Ok(Verdict::Fail(vec![format!(
            "INPLACERISK: HIGH: Not enough free space in {}: {available_gb:.1} GB available, {} GB required",
            self.display_path.display(),
            self.min_free_gb
        )]))
    }
}

pub struct ManagementAgents {
    units: Vec<String>,
}

impl BlockerCheck for ManagementAgents {
    fn name(&self) -> &'static str {
        "management-agents"
    }

    fn description(&self) -> String {
        "No incompatible management agent services are running".to_string()
    }

    fn applies(&self, options: &UpgradeOptions) -> bool {
        !options.skip_vz
    }

    fn evaluate(&self, runner: &mut dyn CommandRunner) -> Result<Verdict> {
        let mut active = Vec::new();
        for unit in &self.units {
            let mut command = Command::new("systemctl");
            command.args(["is-active", "--quiet", unit.as_str()]);
            let output = runner
                .capture(&mut command)
                .with_context(|| format!("failed to query state of {unit}"))?;
            if output.status.success() {
                active.push(unit.as_str());
            }
        }

        if active.is_empty() {
            return Ok(Verdict::Pass);
        }
        Ok(Verdict::Fail(vec![format!(
            "Incompatible management agent services are running: {}; stop and disable them before upgrading",
            active.join(", ")
        )]))
    }
}

pub struct AutomationPackages;

impl BlockerCheck for AutomationPackages {
    fn name(&self) -> &'static str {
        "automation-packages"
    }

    fn description(&self) -> String {
        "Virtuozzo Automation packages are reported if installed".to_string()
    }

    fn applies(&self, options: &UpgradeOptions) -> bool {
        !options.skip_vz
    }

    fn evaluate(&self, runner: &mut dyn CommandRunner) -> Result<Verdict> {
        let mut command = Command::new("rpm");
        command.args(["-qa", "--qf", "%{NAME}\\n"]);
        let raw = capture_stdout(runner, &mut command, "failed to list installed packages")?;
        let detected = raw
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with("va-"))
            .collect::<Vec<_>>();

        if detected.is_empty() {
            return Ok(Verdict::Pass);
        }
        Ok(Verdict::Informational(vec![format!(
            "Virtuozzo Automation packages detected: {}",
            detected.join(", ")
        )]))
    }
}
