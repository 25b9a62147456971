use std::collections::BTreeSet;
use std::process::Command;

use anyhow::{anyhow, Result};
use vzupgrade_core::{
    capture_stdout, parse_guest_ids, parse_roster, CommandRunner, GuestRecord, GuestState,
};

/// Narrow view of the virtualization control plane.
pub trait GuestControl {
    /// Succeeds once the management service accepts requests.
    fn ping(&mut self) -> Result<()>;

    /// Point-in-time listing of every non-template guest.
    fn roster(&mut self) -> Result<Vec<GuestRecord>>;

    fn template_ids(&mut self) -> Result<BTreeSet<String>>;

    fn start(&mut self, id: &str) -> Result<()>;

    fn stop(&mut self, id: &str) -> Result<()>;
}

/// [`GuestControl`] backed by the `prlctl`/`prlsrvctl` tools.
#[derive(Debug, Default)]
pub struct Prlctl<R> {
    runner: R,
}

impl<R: CommandRunner> Prlctl<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn transition(&mut self, action: &str, id: &str) -> Result<()> {
        let mut command = Command::new("prlctl");
        command.args([action, id]);
        capture_stdout(
            &mut self.runner,
            &mut command,
            &format!("failed to {action} guest {id}"),
        )?;
        Ok(())
    }
}

impl<R: CommandRunner> GuestControl for Prlctl<R> {
    fn ping(&mut self) -> Result<()> {
        let mut command = Command::new("prlsrvctl");
        command.arg("info");
        capture_stdout(
            &mut self.runner,
            &mut command,
            "virtualization management service is not available",
        )?;
        Ok(())
    }

    fn roster(&mut self) -> Result<Vec<GuestRecord>> {
        let mut command = Command::new("prlctl");
        command.args([
            "list",
            "--all",
            "--no-header",
            "--output",
            "uuid,status,autostart,name",
        ]);
        let raw = capture_stdout(&mut self.runner, &mut command, "failed to list guests")?;
        parse_roster(&raw)
    }

    fn template_ids(&mut self) -> Result<BTreeSet<String>> {
        let mut command = Command::new("prlctl");
        command.args(["list", "--template", "--no-header", "--output", "uuid"]);
        let raw = capture_stdout(&mut self.runner, &mut command, "failed to list templates")?;
        Ok(parse_guest_ids(&raw))
    }

    fn start(&mut self, id: &str) -> Result<()> {
        self.transition("start", id)
    }

    fn stop(&mut self, id: &str) -> Result<()> {
        self.transition("stop", id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuiesceReport {
    pub stopped: Vec<String>,
    /// Suspended guests cycled through start and stop.
    pub flattened: Vec<String>,
    pub untouched: usize,
}

/// Brings every running or suspended guest to a clean stop.
///
/// Suspended state cannot resume across the storage format change, so such
/// guests are started and immediately stopped. All guests are attempted;
/// any failed transition is reported as one error afterwards.
pub fn quiesce_guests(control: &mut dyn GuestControl) -> Result<QuiesceReport> {
    let roster = control.roster()?;
    let mut report = QuiesceReport::default();
    let mut failures = Vec::new();

    for guest in &roster {
        let result = match &guest.state {
            GuestState::Running => control.stop(&guest.id).map(|()| {
                report.stopped.push(guest.id.clone());
            }),
            GuestState::Suspended => control
                .start(&guest.id)
                .and_then(|()| control.stop(&guest.id))
                .map(|()| {
                    report.flattened.push(guest.id.clone());
                }),
            GuestState::Stopped => {
                report.untouched += 1;
                continue;
            }
            GuestState::Transitional(state) => {
                tracing::warn!(guest = %guest.name, %state, "guest in transitional state left alone");
                report.untouched += 1;
                continue;
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(guest = %guest.name, from = guest.state.as_str(), "guest stopped");
            }
            Err(err) => {
                tracing::error!(guest = %guest.name, error = %format!("{err:#}"), "failed to stop guest");
                failures.push(format!("{} ({err:#})", guest.name));
            }
        }
    }

    if !failures.is_empty() {
        return Err(anyhow!(
            "failed to stop {} guest(s): {}",
            failures.len(),
            failures.join("; ")
        ));
    }
    Ok(report)
}
