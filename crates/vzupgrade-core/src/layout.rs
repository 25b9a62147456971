use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::TargetRelease;

pub const ANSWER_FILES: [&str; 2] = ["answerfile", "answerfile.userchoices"];
pub const MAPPING_FILES: [&str; 2] = ["pes-events", "repomap"];

/// Every host path the orchestrator touches, rooted at `root`.
///
/// Production uses `/`; tests root the layout in a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    root: PathBuf,
}

impl HostLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn system() -> Self {
        Self::new("/")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-roots an absolute host path under this layout.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path
            .components()
            .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
            .collect::<PathBuf>();
        self.root.join(relative)
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.root.join("etc")
    }

    pub fn sshd_config_path(&self) -> PathBuf {
        self.etc_dir().join("ssh").join("sshd_config")
    }

    pub fn yum_repos_dir(&self) -> PathBuf {
        self.etc_dir().join("yum.repos.d")
    }

    pub fn repo_path(&self, file_name: &str) -> PathBuf {
        self.yum_repos_dir().join(file_name)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("usr").join("share").join("vzupgrade")
    }

    pub fn template_path(&self, file_name: &str) -> PathBuf {
        self.templates_dir().join(file_name)
    }

    pub fn leapp_config_dir(&self) -> PathBuf {
        self.etc_dir().join("leapp")
    }

    pub fn answers_source_dir(&self) -> PathBuf {
        self.leapp_config_dir().join("answers")
    }

    pub fn answers_target_dir(&self) -> PathBuf {
        self.root.join("var").join("log").join("leapp")
    }

    pub fn engine_files_dir(&self) -> PathBuf {
        self.leapp_config_dir().join("files")
    }

    /// Fixed name the engine reads, e.g. `pes-events.json`.
    pub fn mapping_link_path(&self, mapping: &str) -> PathBuf {
        self.engine_files_dir().join(format!("{mapping}.json"))
    }

    pub fn mapping_source_name(mapping: &str, release: TargetRelease) -> String {
        format!("{mapping}.{}.json", release.as_str())
    }

    pub fn mapping_source_path(&self, mapping: &str, release: TargetRelease) -> PathBuf {
        self.engine_files_dir()
            .join(Self::mapping_source_name(mapping, release))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join("var").join("lib").join("vzupgrade")
    }

    pub fn snapshot_iflist_path(&self) -> PathBuf {
        self.snapshot_dir().join("iflist")
    }

    pub fn snapshot_services_path(&self) -> PathBuf {
        self.snapshot_dir().join("services")
    }

    pub fn snapshot_archive_path(&self) -> PathBuf {
        self.snapshot_dir().join("etc.tar.gz")
    }

    pub fn snapshot_net_list_path(&self) -> PathBuf {
        self.snapshot_dir().join("net_list")
    }

    pub fn snapshot_build_id_path(&self) -> PathBuf {
        self.snapshot_dir().join("build_id")
    }

    pub fn rpm_db_dir(&self) -> PathBuf {
        self.root.join("var").join("lib").join("rpm")
    }

    pub fn release_file_path(&self) -> PathBuf {
        self.etc_dir().join("virtuozzo-release")
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.etc_dir().join("vzupgrade")
    }

    pub fn default_settings_path(&self) -> PathBuf {
        self.settings_dir().join("vzupgrade.toml")
    }

    pub fn ensure_snapshot_dir(&self) -> Result<()> {
        let dir = self.snapshot_dir();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))
    }
}
