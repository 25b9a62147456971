use anyhow::{anyhow, Result};

/// Major release the host is being upgraded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetRelease {
    #[default]
    Vz8,
    Vz9,
}

impl TargetRelease {
    pub const ALL: [Self; 2] = [Self::Vz8, Self::Vz9];

    pub fn from_use_vz9(use_vz9: bool) -> Self {
        if use_vz9 {
            Self::Vz9
        } else {
            Self::Vz8
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vz8 => "vz8",
            Self::Vz9 => "vz9",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "vz8" => Ok(Self::Vz8),
            "vz9" => Ok(Self::Vz9),
            _ => Err(anyhow!("unknown target release: {value}")),
        }
    }

    fn major(self) -> u8 {
        match self {
            Self::Vz8 => 8,
            Self::Vz9 => 9,
        }
    }

    /// Repository ids always enabled for the engine.
    pub fn repo_ids(self) -> [String; 2] {
        let major = self.major();
        [format!("vz{major}"), format!("vzlinux{major}")]
    }

    pub fn vz_repo_file(self) -> String {
        format!("vz{}.repo", self.major())
    }

    /// Stand-in for the virtualization repo used with `--skip-vz`. Points at
    /// the base distribution so package events keyed on the vz repo still
    /// resolve.
    pub fn dummy_repo_file(self) -> String {
        format!("vz{}_dummy.repo", self.major())
    }

    pub fn base_repo_file(self) -> String {
        format!("vzlinux{}.repo", self.major())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    Debug,
}

impl Verbosity {
    /// `--debug` wins over `--verbose`.
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        if debug {
            Self::Debug
        } else if verbose {
            Self::Verbose
        } else {
            Self::Quiet
        }
    }

    pub fn engine_flag(self) -> Option<&'static str> {
        match self {
            Self::Quiet => None,
            Self::Verbose => Some("--verbose"),
            Self::Debug => Some("--debug"),
        }
    }

    pub fn log_level(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Options for one `check` or `install` run, built once from the command
/// line and passed to every component.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpgradeOptions {
    pub release: TargetRelease,
    pub skip_vz: bool,
    pub enable_repos: Vec<String>,
    pub verbosity: Verbosity,
    pub reboot: bool,
}
