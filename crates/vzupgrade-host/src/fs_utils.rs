use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;

pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Replaces `path` with `content` through a sibling temp file and a rename.
/// An existing file keeps its permission bits.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = parent_dir(path)?;
    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync temp file for {}", path.display()))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions()).with_context(|| {
            format!("failed to carry permissions over to {}", path.display())
        })?;
    }

    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Points `link` at `target`, replacing whatever `link` was. Already-correct
/// links are left alone; returns whether anything changed.
pub fn replace_symlink(link: &Path, target: &Path) -> Result<bool> {
    if fs::read_link(link).is_ok_and(|current| current == target) {
        return Ok(false);
    }

    let staged = staged_link_path(link)?;
    remove_file_if_exists(&staged)
        .with_context(|| format!("failed to clear stale {}", staged.display()))?;
    symlink(target, &staged)
        .with_context(|| format!("failed to create symlink {}", staged.display()))?;
    fs::rename(&staged, link).with_context(|| {
        format!(
            "failed to move symlink into place: {} -> {}",
            link.display(),
            target.display()
        )
    })?;
    Ok(true)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

fn parent_dir(path: &Path) -> Result<&Path> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("path has no parent directory: {}", path.display()))
}

fn staged_link_path(link: &Path) -> Result<PathBuf> {
    let name = link
        .file_name()
        .ok_or_else(|| anyhow!("link path has no file name: {}", link.display()))?;
    let mut staged = name.to_os_string();
    staged.push(".vzupgrade-new");
    Ok(link.with_file_name(staged))
}
