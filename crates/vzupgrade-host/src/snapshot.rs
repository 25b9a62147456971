//! Advisory host-state capture taken right before the destructive upgrade.
//!
//! Nothing here is read back by the orchestrator; it exists for manual
//! recovery. Every step is best effort and a failed step never stops the
//! following ones.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use vzupgrade_core::{capture_stdout, CommandRunner};

use crate::fs_utils::{remove_file_if_exists, write_atomic};
use crate::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStep {
    Interfaces,
    Services,
    ConfigArchive,
    VirtualNetworks,
    BuildId,
}

impl SnapshotStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interfaces => "interfaces",
            Self::Services => "services",
            Self::ConfigArchive => "config-archive",
            Self::VirtualNetworks => "virtual-networks",
            Self::BuildId => "build-id",
        }
    }
}

impl fmt::Display for SnapshotStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(SnapshotStep, String)>,
}

impl SnapshotReport {
    fn record(&mut self, step: SnapshotStep, result: Result<Option<PathBuf>>) {
        match result {
            Ok(Some(path)) => {
                tracing::info!(step = step.as_str(), path = %path.display(), "snapshot step written");
                self.written.push(path);
            }
            Ok(None) => tracing::debug!(step = step.as_str(), "snapshot step had nothing to record"),
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(step = step.as_str(), error = %message, "snapshot step failed");
                self.failed.push((step, message));
            }
        }
    }
}

pub fn capture_snapshot(ctx: &RunContext, runner: &mut dyn CommandRunner) -> SnapshotReport {
    let layout = &ctx.layout;
    let mut report = SnapshotReport::default();
    if let Err(err) = layout.ensure_snapshot_dir() {
        tracing::warn!(error = %format!("{err:#}"), "snapshot directory unavailable");
    }

    let mut ip = Command::new("ip");
    ip.arg("a");
    report.record(
        SnapshotStep::Interfaces,
        save_command_output(runner, &mut ip, &layout.snapshot_iflist_path()).map(Some),
    );

    let mut services = Command::new("systemctl");
    services.args([
        "list-unit-files",
        "--type=service",
        "--state=enabled",
        "--no-legend",
    ]);
    report.record(
        SnapshotStep::Services,
        save_command_output(runner, &mut services, &layout.snapshot_services_path()).map(Some),
    );

    let archive = layout.snapshot_archive_path();
    report.record(
        SnapshotStep::ConfigArchive,
        archive_directory(&layout.etc_dir(), "etc", &archive).map(|()| Some(archive.clone())),
    );

    if !ctx.options.skip_vz {
        let mut networks = Command::new("prlsrvctl");
        networks.args(["net", "list"]);
        report.record(
            SnapshotStep::VirtualNetworks,
            save_command_output(runner, &mut networks, &layout.snapshot_net_list_path())
                .map(Some),
        );
    } else {
        report.record(
            SnapshotStep::VirtualNetworks,
            discard_stale(&layout.snapshot_net_list_path()),
        );
    }

    report.record(
        SnapshotStep::BuildId,
        record_build_id(&layout.release_file_path(), &layout.snapshot_build_id_path()),
    );

    report
}

fn save_command_output(
    runner: &mut dyn CommandRunner,
    command: &mut Command,
    destination: &Path,
) -> Result<PathBuf> {
    let context = format!("failed to collect {}", destination.display());
    let output = capture_stdout(runner, command, &context)?;
    write_atomic(destination, output.as_bytes())?;
    Ok(destination.to_path_buf())
}

/// Writes a gzip tarball of `source` to `destination`, entries prefixed with
/// `entry_name`. Symlinks are stored as links.
pub fn archive_directory(source: &Path, entry_name: &str, destination: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(anyhow!("archive source is not a directory: {}", source.display()));
    }
    let parent = destination
        .parent()
        .ok_or_else(|| anyhow!("archive path has no parent: {}", destination.display()))?;

    let temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp archive in {}", parent.display()))?;
    let encoder = GzEncoder::new(temp, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir(entry_name, source)
        .with_context(|| format!("failed to archive {}", source.display()))?;
    let skipped = append_tree(&mut builder, source, Path::new(entry_name))?;
    if skipped > 0 {
        tracing::warn!(source = %source.display(), skipped, "archive written without some entries");
    }

    let encoder = builder
        .into_inner()
        .with_context(|| format!("failed to finish archive of {}", source.display()))?;
    let mut temp = encoder
        .finish()
        .with_context(|| format!("failed to compress archive of {}", source.display()))?;
    temp.flush()
        .with_context(|| format!("failed to flush {}", destination.display()))?;
    temp.persist(destination)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to store {}", destination.display()))?;
    Ok(())
}

/// Appends the contents of `dir` under `archive_dir`, depth first in name
/// order. Sockets, fifos, devices and entries that cannot be read are
/// skipped; returns how many were.
fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    archive_dir: &Path,
) -> Result<usize> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .with_context(|| format!("failed to list {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut skipped = 0;
    for entry in entries {
        let path = entry.path();
        let name = archive_dir.join(entry.file_name());
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                skipped += 1;
                continue;
            }
        };

        if file_type.is_dir() {
            if let Err(err) = builder.append_dir(&name, &path) {
                tracing::warn!(path = %path.display(), error = %err, "skipping directory");
                skipped += 1;
                continue;
            }
            match append_tree(builder, &path, &name) {
                Ok(count) => skipped += count,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "skipping directory contents");
                    skipped += 1;
                }
            }
        } else if file_type.is_file() || file_type.is_symlink() {
            if let Err(err) = builder.append_path_with_name(&path, &name) {
                tracing::warn!(path = %path.display(), error = %err, "skipping entry");
                skipped += 1;
            }
        } else {
            tracing::warn!(path = %path.display(), "skipping special file");
            skipped += 1;
        }
    }
    Ok(skipped)
}

/// Leftovers from an earlier attempt must not pass for this one's.
fn discard_stale(path: &Path) -> Result<Option<PathBuf>> {
    if remove_file_if_exists(path)
        .with_context(|| format!("failed to remove stale {}", path.display()))?
    {
        tracing::debug!(path = %path.display(), "removed stale snapshot file");
    }
    Ok(None)
}

/// Stores the numeric build weight of the running release. Hosts without a
/// parseable release file simply get no record.
fn record_build_id(release_file: &Path, destination: &Path) -> Result<Option<PathBuf>> {
    let Ok(raw) = fs::read_to_string(release_file) else {
        return discard_stale(destination);
    };
    let Some(hash) = raw.lines().next().and_then(release_build_hash) else {
        return discard_stale(destination);
    };
    write_atomic(destination, format!("{hash}\n").as_bytes())?;
    Ok(Some(destination.to_path_buf()))
}

/// `Virtuozzo Linux release 7.5.3 (123)` → `7*10000 + 5*1000 + 3*100 + 123`.
pub(crate) fn release_build_hash(line: &str) -> Option<u64> {
    let (_, version) = line.split_once("release ")?;
    let normalized = version.trim().replace(" (", ".").replace(')', "");
    let parts = normalized
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [major, minor, patch, build] = parts.as_slice() else {
        return None;
    };
    Some(major * 10_000 + minor * 1_000 + patch * 100 + build)
}
