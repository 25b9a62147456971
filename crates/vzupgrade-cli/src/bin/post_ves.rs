use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use vzupgrade_core::{init_logging, HostLayout, Settings, SystemRunner, Verbosity};
use vzupgrade_host::{run_post_boot, PostBootOutcome, Prlctl, RetryPolicy, ThreadSleeper};

/// Starts autostart guests once the virtualization service is back after an
/// upgrade reboot.
#[derive(Parser, Debug)]
#[command(name = "vzupgrade-post-ves", version)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, hide = true, value_name = "DIR")]
    root: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Boot units log at info so the journal shows the outcome.
    let verbosity = Verbosity::from_flags(true, cli.debug);
    init_logging(verbosity.log_level())?;

    let layout = cli.root.map(HostLayout::new).unwrap_or_else(HostLayout::system);
    let settings = Settings::resolve(cli.config.as_deref(), &layout)?;
    let policy = RetryPolicy::from_settings(&settings);

    let mut control = Prlctl::new(SystemRunner);
    match run_post_boot(&mut control, policy, &mut ThreadSleeper)? {
        PostBootOutcome::Started(report) => {
            tracing::info!(
                started = report.started.len(),
                failed = report.failed.len(),
                skipped_templates = report.skipped_templates,
                "autostart guests processed"
            );
        }
        PostBootOutcome::GaveUp { attempts } => {
            tracing::warn!(attempts, "guests were not started");
        }
    }
    Ok(())
}
