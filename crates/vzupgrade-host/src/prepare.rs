//! Host file fix-ups applied before every `check` and `install`.
//!
//! Each step is idempotent: a second run over a prepared host rewrites no
//! bytes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use vzupgrade_core::{HostLayout, TargetRelease, ANSWER_FILES, MAPPING_FILES};

use crate::fs_utils::{ensure_dir, remove_file_if_exists, replace_symlink, write_atomic};
use crate::RunContext;

const ROOT_LOGIN_DIRECTIVE: &str = "PermitRootLogin";
const ROOT_LOGIN_LINE: &str = "PermitRootLogin yes";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareReport {
    /// Files created, rewritten or removed by this run.
    pub changed: Vec<PathBuf>,
    /// Answer files are replaced on every run.
    pub answer_files: Vec<PathBuf>,
}

pub fn prepare_files(ctx: &RunContext) -> Result<PrepareReport> {
    let layout = &ctx.layout;
    let release = ctx.options.release;
    let mut report = PrepareReport::default();

    let sshd_config = layout.sshd_config_path();
    if ensure_root_login_directive(&sshd_config)? {
        report.changed.push(sshd_config);
    }
    report
        .changed
        .extend(sync_repo_files(layout, release, ctx.options.skip_vz)?);
    report.answer_files = install_answer_files(layout)?;
    report.changed.extend(link_mapping_files(layout, release)?);

    tracing::info!(changed = report.changed.len(), "host files prepared");
    Ok(report)
}

/// Makes the root-login policy explicit; the two major releases ship
/// different defaults.
pub fn ensure_root_login_directive(path: &Path) -> Result<bool> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read sshd config: {}", path.display()))?;
    let Some(updated) = insert_root_login_directive(&content) else {
        return Ok(false);
    };

    write_atomic(path, updated.as_bytes())?;
    tracing::info!(path = %path.display(), "added explicit {ROOT_LOGIN_LINE}");
    Ok(true)
}

/// Returns the patched config, or `None` when a directive is already set.
pub(crate) fn insert_root_login_directive(content: &str) -> Option<String> {
    let lines = content.split_inclusive('\n').collect::<Vec<_>>();
    if lines
        .iter()
        .any(|line| line.trim_start().starts_with(ROOT_LOGIN_DIRECTIVE))
    {
        return None;
    }

    let anchor = lines
        .iter()
        .position(|line| line.contains(ROOT_LOGIN_DIRECTIVE))
        .or_else(|| {
            lines.iter().position(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
        });

    let mut out = String::with_capacity(content.len() + ROOT_LOGIN_LINE.len() + 1);
    match anchor {
        Some(index) => {
            for (position, line) in lines.iter().enumerate() {
                if position == index {
                    out.push_str(ROOT_LOGIN_LINE);
                    out.push('\n');
                }
                out.push_str(line);
            }
        }
        None => {
            out.push_str(content);
            if !content.is_empty() && !content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(ROOT_LOGIN_LINE);
            out.push('\n');
        }
    }
    Some(out)
}

/// Activates the normal or the virtualization-skipped repository set.
///
/// Exclusive files of every other set, for any release, go first so two
/// sets never coexist; present files of the active set are left untouched.
pub fn sync_repo_files(
    layout: &HostLayout,
    release: TargetRelease,
    skip_vz: bool,
) -> Result<Vec<PathBuf>> {
    let active = if skip_vz {
        release.dummy_repo_file()
    } else {
        release.vz_repo_file()
    };
    let stale_files = TargetRelease::ALL
        .iter()
        .flat_map(|candidate| [candidate.vz_repo_file(), candidate.dummy_repo_file()])
        .filter(|file_name| *file_name != active)
        .collect::<Vec<_>>();
    let wanted = [active, release.base_repo_file()];

    for file_name in &wanted {
        let template = layout.template_path(file_name);
        if !template.is_file() {
            return Err(anyhow!(
                "repository template is missing: {}",
                template.display()
            ));
        }
    }

    let mut changed = Vec::new();
    for file_name in &stale_files {
        let stale_path = layout.repo_path(file_name);
        if remove_file_if_exists(&stale_path).with_context(|| {
            format!("failed to remove stale repo file: {}", stale_path.display())
        })? {
            tracing::info!(path = %stale_path.display(), "removed stale repository file");
            changed.push(stale_path);
        }
    }

    ensure_dir(&layout.yum_repos_dir())?;
    for file_name in &wanted {
        let target = layout.repo_path(file_name);
        if target.exists() {
            continue;
        }
        let template = layout.template_path(file_name);
        fs::copy(&template, &target).with_context(|| {
            format!(
                "failed to install repo file {} from {}",
                target.display(),
                template.display()
            )
        })?;
        tracing::info!(path = %target.display(), "installed repository file");
        changed.push(target);
    }

    Ok(changed)
}

/// Replaces the engine's answer files with the canonical copies. Never
/// merges: answers left by an aborted attempt must not carry forward.
pub fn install_answer_files(layout: &HostLayout) -> Result<Vec<PathBuf>> {
    let source_dir = layout.answers_source_dir();
    for file_name in ANSWER_FILES {
        let source = source_dir.join(file_name);
        if !source.is_file() {
            return Err(anyhow!("answer file template is missing: {}", source.display()));
        }
    }

    let target_dir = layout.answers_target_dir();
    ensure_dir(&target_dir)?;

    let mut refreshed = Vec::new();
    for file_name in ANSWER_FILES {
        let source = source_dir.join(file_name);
        let target = target_dir.join(file_name);
        remove_file_if_exists(&target)
            .with_context(|| format!("failed to remove old answer file: {}", target.display()))?;
        fs::copy(&source, &target).with_context(|| {
            format!(
                "failed to copy answer file {} to {}",
                source.display(),
                target.display()
            )
        })?;
        refreshed.push(target);
    }

    tracing::debug!(count = refreshed.len(), "answer files refreshed");
    Ok(refreshed)
}

/// Points each fixed mapping name the engine reads at the release-specific
/// source next to it.
pub fn link_mapping_files(layout: &HostLayout, release: TargetRelease) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for mapping in MAPPING_FILES {
        let source = layout.mapping_source_path(mapping, release);
        if !source.is_file() {
            return Err(anyhow!(
                "package migration mapping is missing: {}",
                source.display()
            ));
        }

        let link = layout.mapping_link_path(mapping);
        let target = PathBuf::from(HostLayout::mapping_source_name(mapping, release));
        if replace_symlink(&link, &target)? {
            tracing::info!(
                link = %link.display(),
                target = %target.display(),
                "linked package migration mapping"
            );
            changed.push(link);
        }
    }
    Ok(changed)
}
