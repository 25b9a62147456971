use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use vzupgrade_core::{TargetRelease, UpgradeOptions, Verbosity};

mod completion;
mod dispatch;
mod render;

use completion::CompletionShell;

#[derive(Parser, Debug)]
#[command(name = "vzupgrade", version)]
#[command(about = "Upgrade a Virtuozzo host to the next major release", long_about = None)]
struct Cli {
    /// Settings file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Treat DIR as the host filesystem root.
    #[arg(long, global = true, hide = true, value_name = "DIR")]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct EngineArgs {
    /// Upgrade to Virtuozzo 9 instead of Virtuozzo 8.
    #[arg(long)]
    use_vz9: bool,
    /// Extra repositories to enable for the upgrade engine.
    #[arg(long, value_name = "REPO", num_args = 1..)]
    enablerepo: Vec<String>,
    /// Leave virtualization packages and guests out of the upgrade.
    #[arg(long)]
    skip_vz: bool,
    #[arg(long)]
    verbose: bool,
    /// Implies --verbose.
    #[arg(long)]
    debug: bool,
}

impl EngineArgs {
    fn upgrade_options(&self, reboot: bool) -> UpgradeOptions {
        UpgradeOptions {
            release: TargetRelease::from_use_vz9(self.use_vz9),
            skip_vz: self.skip_vz,
            enable_repos: self.enablerepo.clone(),
            verbosity: Verbosity::from_flags(self.verbose, self.debug),
            reboot,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare the host and report upgrade blockers.
    Check {
        /// Stop after the blocker checks.
        #[arg(long)]
        blocker: bool,
        /// Print the blocker report as JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run the upgrade.
    Install {
        /// Reboot into the upgrade environment when staging succeeds.
        #[arg(long)]
        reboot: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Show the prerequisites verified before an upgrade.
    List,
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch::run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
