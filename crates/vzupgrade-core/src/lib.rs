mod layout;
mod logging;
mod options;
mod roster;
mod runner;
mod settings;

pub use layout::{HostLayout, ANSWER_FILES, MAPPING_FILES};
pub use logging::{init_logging, LOG_ENV};
pub use options::{TargetRelease, UpgradeOptions, Verbosity};
pub use roster::{parse_guest_ids, parse_roster, GuestRecord, GuestState};
pub use runner::{
    capture_stdout, describe_command, CapturedOutput, CommandRunner, CommandStatus, SystemRunner,
};
pub use settings::{Settings, DEFAULT_MIN_FREE_GB, DEFAULT_RETRY_ATTEMPTS};

#[cfg(test)]
mod tests;
