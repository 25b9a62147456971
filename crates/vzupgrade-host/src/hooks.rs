use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use vzupgrade_core::{CommandRunner, CommandStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub path: PathBuf,
    /// `None` when the hook could not be started.
    pub status: Option<CommandStatus>,
}

impl HookOutcome {
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(CommandStatus::success)
    }
}

/// Runs every executable entry of `dir` in lexical order.
///
/// Hooks are advisory: failures are logged and never abort the caller. A
/// missing directory runs nothing.
pub fn run_hooks(dir: &Path, runner: &mut dyn CommandRunner) -> Vec<HookOutcome> {
    let hooks = match discover_hooks(dir) {
        Ok(hooks) => hooks,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "no hook directory");
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "hook directory unreadable, skipping hooks");
            return Vec::new();
        }
    };

    let mut outcomes = Vec::with_capacity(hooks.len());
    for path in hooks {
        let status = match runner.run(&mut Command::new(&path)) {
            Ok(status) => {
                if status.success() {
                    tracing::info!(hook = %path.display(), "hook finished");
                } else {
                    tracing::warn!(hook = %path.display(), %status, "hook failed");
                }
                Some(status)
            }
            Err(err) => {
                tracing::warn!(hook = %path.display(), error = %format!("{err:#}"), "hook could not be started");
                None
            }
        };
        outcomes.push(HookOutcome { path, status });
    }
    outcomes
}

pub(crate) fn discover_hooks(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Ok(metadata) = fs::metadata(&path) else {
            tracing::warn!(hook = %path.display(), "dangling hook entry, skipping");
            continue;
        };
        if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
            entries.push(path);
        }
    }
    entries.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(entries)
}
