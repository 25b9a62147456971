use vzupgrade_core::{HostLayout, Settings, UpgradeOptions};

mod autostart;
mod blockers;
mod engine;
mod fs_utils;
mod guests;
mod hooks;
mod orchestrator;
mod prepare;
mod snapshot;

pub use autostart::{
    connect_with_retry, run_post_boot, start_autostart_guests, AutostartReport, PostBootOutcome,
    RetryOutcome, RetryPolicy, Sleeper, ThreadSleeper,
};
pub use blockers::{
    available_bytes, run_gate, standard_checks, standard_checks_with_space_reader, BlockerCheck, Finding,
    FindingKind, GateReport, FreeSpaceReader, Verdict, BLOCKER_SET_VERSION,
};
pub use engine::{
    build_engine_command, reboot_host, run_engine, EngineMode, ENGINE_PROGRAM, SKIP_VZ_ENV,
};
pub use fs_utils::{remove_file_if_exists, replace_symlink, write_atomic};
pub use guests::{quiesce_guests, GuestControl, Prlctl, QuiesceReport};
pub use hooks::{run_hooks, HookOutcome};
pub use orchestrator::{
    run_check, run_install, CheckOutcome, HostServices, InstallOutcome, InstallReport, Phase,
    PhaseObserver, SilentObserver,
};
pub use prepare::{
    ensure_root_login_directive, install_answer_files, link_mapping_files, prepare_files,
    sync_repo_files, PrepareReport,
};
pub use snapshot::{archive_directory, capture_snapshot, SnapshotReport, SnapshotStep};

/// Everything a run needs to know, built once by the caller and handed to
/// each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub layout: HostLayout,
    pub settings: Settings,
    pub options: UpgradeOptions,
}

impl RunContext {
    pub fn new(layout: HostLayout, settings: Settings, options: UpgradeOptions) -> Self {
        Self {
            layout,
            settings,
            options,
        }
    }
}
