use std::path::Path;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use vzupgrade_core::{init_logging, HostLayout, Settings, SystemRunner, UpgradeOptions};
use vzupgrade_host::{
    run_check, run_install, standard_checks, CheckOutcome, HostServices, InstallOutcome,
    InstallReport, Prlctl, RunContext,
};

use crate::completion::write_completions_script;
use crate::render::{
    current_output_style, format_gate_lines, format_prerequisite_lines, OutputStyle,
    TerminalRenderer,
};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<ExitCode> {
    let layout = cli
        .root
        .clone()
        .map(HostLayout::new)
        .unwrap_or_else(HostLayout::system);

    match cli.command {
        Commands::Check {
            blocker,
            json,
            engine,
        } => {
            let options = engine.upgrade_options(false);
            init_logging(options.verbosity.log_level())?;
            install_interrupt_handler()?;
            let ctx = load_context(cli.config.as_deref(), layout, options)?;
            let renderer = TerminalRenderer::from_style(current_output_style(json));

            let outcome = execute_check(&ctx, blocker, renderer)?;
            if json {
                let rendered = serde_json::to_string_pretty(&outcome.gate)
                    .context("failed to serialize blocker report")?;
                println!("{rendered}");
            } else {
                print_check_outcome(&ctx, &outcome, renderer);
            }
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Commands::Install { reboot, engine } => {
            let options = engine.upgrade_options(reboot);
            init_logging(options.verbosity.log_level())?;
            install_interrupt_handler()?;
            let ctx = load_context(cli.config.as_deref(), layout, options)?;
            let renderer = TerminalRenderer::from_style(current_output_style(false));

            match execute_install(&ctx, renderer)? {
                InstallOutcome::Blocked(gate) => {
                    renderer.print_lines(&format_gate_lines(&gate, renderer.style()));
                    Ok(ExitCode::FAILURE)
                }
                InstallOutcome::Upgraded(report) => {
                    print_install_report(&ctx, &report, renderer);
                    renderer.print_status(
                        "ok",
                        "Upgrade prepared. Reboot the host to continue the upgrade",
                    );
                    Ok(ExitCode::SUCCESS)
                }
                InstallOutcome::RebootIssued(report) => {
                    print_install_report(&ctx, &report, renderer);
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Commands::List => {
            init_logging(UpgradeOptions::default().verbosity.log_level())?;
            let settings = Settings::resolve(cli.config.as_deref(), &layout).unwrap_or_else(|err| {
                tracing::warn!(error = %format!("{err:#}"), "using default settings");
                Settings::default()
            });
            let ctx = RunContext::new(layout, settings, UpgradeOptions::default());
            let descriptions = standard_checks(&ctx)
                .iter()
                .map(|check| check.description())
                .collect::<Vec<_>>();
            for line in format_prerequisite_lines(&descriptions) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_context(
    config: Option<&Path>,
    layout: HostLayout,
    options: UpgradeOptions,
) -> Result<RunContext> {
    let settings = Settings::resolve(config, &layout)?;
    tracing::debug!(root = %layout.root().display(), ?settings, "settings loaded");
    Ok(RunContext::new(layout, settings, options))
}

fn execute_check(
    ctx: &RunContext,
    blockers_only: bool,
    renderer: TerminalRenderer,
) -> Result<CheckOutcome> {
    let mut runner = SystemRunner;
    let mut guests = Prlctl::new(SystemRunner);
    let mut progress = renderer.phase_progress();
    let mut services = HostServices {
        runner: &mut runner,
        guests: &mut guests,
        checks: standard_checks(ctx),
        observer: &mut progress,
    };
    run_check(ctx, blockers_only, &mut services)
}

fn execute_install(ctx: &RunContext, renderer: TerminalRenderer) -> Result<InstallOutcome> {
    let mut runner = SystemRunner;
    let mut guests = Prlctl::new(SystemRunner);
    let mut progress = renderer.phase_progress();
    let mut services = HostServices {
        runner: &mut runner,
        guests: &mut guests,
        checks: standard_checks(ctx),
        observer: &mut progress,
    };
    run_install(ctx, &mut services)
}

fn print_check_outcome(ctx: &RunContext, outcome: &CheckOutcome, renderer: TerminalRenderer) {
    for hook in outcome.hooks.iter().filter(|hook| !hook.succeeded()) {
        renderer.print_status(
            "warn",
            &format!("precheck hook failed: {}", hook.path.display()),
        );
    }
    renderer.print_lines(&format_gate_lines(&outcome.gate, renderer.style()));

    if let Some(status) = outcome.dry_run.filter(|status| !status.success()) {
        renderer.print_status(
            "err",
            &format!(
                "Upgrade pre-check failed ({status}); see the report in {}",
                ctx.layout.answers_target_dir().display()
            ),
        );
    }
}

fn print_install_report(ctx: &RunContext, report: &InstallReport, renderer: TerminalRenderer) {
    renderer.print_lines(&format_gate_lines(&report.gate, renderer.style()));
    for hook in report.hooks.iter().filter(|hook| !hook.succeeded()) {
        renderer.print_status(
            "warn",
            &format!("preinstall hook failed: {}", hook.path.display()),
        );
    }
    for (step, reason) in &report.snapshot.failed {
        renderer.print_status("warn", &format!("snapshot step {step} skipped: {reason}"));
    }
    if renderer.style() == OutputStyle::Rich {
        renderer.print_status(
            "ok",
            &format!(
                "host configuration saved to {}",
                ctx.layout.snapshot_dir().display()
            ),
        );
    }
}

/// Operator interrupts end the run quietly with status 0.
fn install_interrupt_handler() -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    thread::Builder::new()
        .name("vzupgrade-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::warn!(signal, "interrupted, exiting");
                std::process::exit(0);
            }
        })
        .context("failed to spawn signal listener")?;
    Ok(())
}
