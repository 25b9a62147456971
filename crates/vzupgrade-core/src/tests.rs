use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::*;

#[test]
fn system_layout_matches_host_paths() {
    let layout = HostLayout::system();
    assert_eq!(
        layout.sshd_config_path(),
        PathBuf::from("/etc/ssh/sshd_config")
    );
    assert_eq!(
        layout.repo_path("vz8.repo"),
        PathBuf::from("/etc/yum.repos.d/vz8.repo")
    );
    assert_eq!(
        layout.template_path("vz8_dummy.repo"),
        PathBuf::from("/usr/share/vzupgrade/vz8_dummy.repo")
    );
    assert_eq!(layout.answers_target_dir(), PathBuf::from("/var/log/leapp"));
    assert_eq!(
        layout.mapping_link_path("pes-events"),
        PathBuf::from("/etc/leapp/files/pes-events.json")
    );
    assert_eq!(
        layout.snapshot_archive_path(),
        PathBuf::from("/var/lib/vzupgrade/etc.tar.gz")
    );
}

#[test]
fn resolve_reroots_absolute_paths() {
    let layout = HostLayout::new("/tmp/host-root");
    assert_eq!(
        layout.resolve(Path::new("/etc/vzupgrade/precheck.d")),
        PathBuf::from("/tmp/host-root/etc/vzupgrade/precheck.d")
    );
    assert_eq!(
        HostLayout::system().resolve(Path::new("/var/lib")),
        PathBuf::from("/var/lib")
    );
}

#[test]
fn mapping_sources_are_release_specific() {
    let layout = HostLayout::system();
    assert_eq!(
        layout.mapping_source_path("repomap", TargetRelease::Vz9),
        PathBuf::from("/etc/leapp/files/repomap.vz9.json")
    );
    assert_eq!(
        HostLayout::mapping_source_name("pes-events", TargetRelease::Vz8),
        "pes-events.vz8.json"
    );
}

#[test]
fn release_names_repo_files_and_ids() {
    assert_eq!(TargetRelease::from_use_vz9(false), TargetRelease::Vz8);
    assert_eq!(TargetRelease::Vz8.repo_ids(), ["vz8", "vzlinux8"]);
    assert_eq!(TargetRelease::Vz9.repo_ids(), ["vz9", "vzlinux9"]);
    assert_eq!(TargetRelease::Vz9.vz_repo_file(), "vz9.repo");
    assert_eq!(TargetRelease::Vz9.dummy_repo_file(), "vz9_dummy.repo");
    assert_eq!(TargetRelease::Vz8.base_repo_file(), "vzlinux8.repo");
    assert_eq!(
        TargetRelease::parse("vz9").expect("must parse"),
        TargetRelease::Vz9
    );
    assert!(TargetRelease::parse("vz10").is_err());
}

#[test]
fn debug_wins_over_verbose() {
    assert_eq!(Verbosity::from_flags(true, true), Verbosity::Debug);
    assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
    assert_eq!(Verbosity::from_flags(false, false), Verbosity::Quiet);
    assert_eq!(Verbosity::Debug.engine_flag(), Some("--debug"));
    assert_eq!(Verbosity::Quiet.engine_flag(), None);
    assert_eq!(Verbosity::Verbose.log_level(), "info");
}

#[test]
fn settings_default_when_file_missing() {
    let path = std::env::temp_dir().join(format!(
        "vzupgrade-core-missing-{}.toml",
        std::process::id()
    ));
    let settings = Settings::load(&path).expect("missing file must yield defaults");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.min_free_gb, DEFAULT_MIN_FREE_GB);
    assert_eq!(settings.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(settings.retry_interval(), Duration::from_secs(10));
}

#[test]
fn settings_parse_partial_overrides() {
    let settings = Settings::from_toml_str(
        r#"
free_space_path = "/vz"
min_free_gb = 20
extra_supported_templates = ["almalinux-9-x86_64"]
retry_attempts = 3
"#,
    )
    .expect("settings must parse");

    assert_eq!(settings.free_space_path, PathBuf::from("/vz"));
    assert_eq!(settings.min_free_bytes(), 20 * 1024 * 1024 * 1024);
    assert_eq!(settings.extra_supported_templates, vec!["almalinux-9-x86_64"]);
    assert_eq!(settings.retry_attempts, 3);
    assert_eq!(
        settings.precheck_hooks_dir,
        PathBuf::from("/etc/vzupgrade/precheck.d")
    );
}

#[test]
fn settings_reject_unknown_keys_and_zero_attempts() {
    let err = Settings::from_toml_str("min_free = 3\n").expect_err("unknown key must fail");
    assert!(err.to_string().contains("failed to parse vzupgrade settings"));

    let err = Settings::from_toml_str("retry_attempts = 0\n").expect_err("zero attempts must fail");
    assert!(err.to_string().contains("retry_attempts must be at least 1"));
}

#[test]
fn settings_resolve_requires_explicit_file_but_not_default() {
    let root = std::env::temp_dir().join(format!(
        "vzupgrade-core-resolve-{}",
        std::process::id()
    ));
    let layout = HostLayout::new(&root);

    let settings = Settings::resolve(None, &layout).expect("default file is optional");
    assert_eq!(settings, Settings::default());

    let explicit = root.join("custom.toml");
    let err = Settings::resolve(Some(explicit.as_path()), &layout).expect_err("explicit file must exist");
    assert!(err.to_string().contains("settings file not found"));

    std::fs::create_dir_all(layout.settings_dir()).expect("must create settings dir");
    std::fs::write(layout.default_settings_path(), "min_free_gb = 9\n").expect("must write");
    let settings = Settings::resolve(None, &layout).expect("default file must load");
    assert_eq!(settings.min_free_gb, 9);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn parse_roster_reads_states_and_names() {
    let raw = "{a1} running on web 01\n{b2} suspended off db\n\n{c3} stopped auto cache\n{d4} mounted off backup\n";
    let guests = parse_roster(raw).expect("roster must parse");

    assert_eq!(guests.len(), 4);
    assert_eq!(guests[0].id, "{a1}");
    assert_eq!(guests[0].name, "web 01");
    assert_eq!(guests[0].state, GuestState::Running);
    assert!(guests[0].autostart);
    assert_eq!(guests[1].state, GuestState::Suspended);
    assert!(!guests[1].autostart);
    assert!(guests[2].autostart);
    assert_eq!(
        guests[3].state,
        GuestState::Transitional("mounted".to_string())
    );
    assert_eq!(guests[3].state.as_str(), "mounted");
}

#[test]
fn parse_roster_autostart_tokens() {
    let guests = parse_roster("{a1} stopped yes a\n{b2} stopped no b\n{c3} stopped off c\n")
        .expect("roster must parse");
    let autostart = guests.iter().map(|guest| guest.autostart).collect::<Vec<_>>();
    assert_eq!(autostart, vec![true, false, false]);
}

#[test]
fn parse_roster_rejects_short_rows() {
    let err = parse_roster("{a1} running\n").expect_err("short row must fail");
    assert!(err.to_string().contains("malformed guest roster row"));
}

#[test]
fn parse_roster_accepts_empty_listing() {
    assert!(parse_roster("").expect("empty roster").is_empty());
    assert!(parse_guest_ids("\n").is_empty());
}

#[test]
fn parse_guest_ids_takes_first_column() {
    let ids = parse_guest_ids("{t1}\n{t2} extra\n");
    assert!(ids.contains("{t1}"));
    assert!(ids.contains("{t2}"));
    assert_eq!(ids.len(), 2);
}

#[test]
fn command_status_reports_code() {
    assert!(CommandStatus::from_code(0).success());
    assert!(!CommandStatus::from_code(100).success());
    assert_eq!(CommandStatus::from_code(100).to_string(), "exit status 100");
    assert_eq!(CommandStatus::signaled().to_string(), "terminated by signal");
}

#[test]
fn describe_command_joins_program_and_args() {
    let mut command = Command::new("prlctl");
    command.args(["stop", "{a1}"]);
    assert_eq!(describe_command(&command), "prlctl stop {a1}");
}

#[test]
fn capture_stdout_reports_failure_context() {
    struct Failing;
    impl CommandRunner for Failing {
        fn run(&mut self, _command: &mut Command) -> anyhow::Result<CommandStatus> {
            Ok(CommandStatus::from_code(1))
        }
        fn capture(&mut self, _command: &mut Command) -> anyhow::Result<CapturedOutput> {
            Ok(CapturedOutput {
                status: CommandStatus::from_code(2),
                stdout: String::new(),
                stderr: "no such command\n".to_string(),
            })
        }
        fn replace_process(&mut self, _command: &mut Command) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let err = capture_stdout(&mut Failing, &mut Command::new("vzlist"), "failed to list")
        .expect_err("non-zero exit must fail");
    assert_eq!(
        err.to_string(),
        "failed to list: status=exit status 2 stdout='' stderr='no such command'"
    );
}
