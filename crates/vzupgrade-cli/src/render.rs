use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use vzupgrade_host::{FindingKind, GateReport, Phase, PhaseObserver};

pub(crate) const GATE_PASSED_LINE: &str = "No upgrade blockers found!";
pub(crate) const GATE_FAILED_LINE: &str =
    "Critical blockers found, please fix them before trying to upgrade";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

/// Machine-readable output always gets plain rendering.
pub(crate) fn resolve_output_style(stdout_is_tty: bool, json: bool) -> OutputStyle {
    if stdout_is_tty && !json {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style(json: bool) -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal(), json)
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn phase_progress(self) -> PhaseProgress {
        PhaseProgress {
            renderer: self,
            active: None,
        }
    }
}

/// Spinner around quiet phases; section headers before phases whose tools
/// print to the terminal themselves.
pub(crate) struct PhaseProgress {
    renderer: TerminalRenderer,
    active: Option<(ProgressBar, Instant)>,
}

impl PhaseObserver for PhaseProgress {
    fn phase_started(&mut self, phase: Phase) {
        if self.renderer.style == OutputStyle::Plain {
            return;
        }
        if phase.is_interactive() {
            self.renderer.print_section(phase.label());
            return;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}") {
            spinner.set_style(style.tick_chars("|/-\\ "));
        }
        spinner.set_message(phase.label());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.active = Some((spinner, Instant::now()));
    }

    fn phase_finished(&mut self, phase: Phase, ok: bool) {
        let Some((spinner, started_at)) = self.active.take() else {
            return;
        };
        spinner.finish_and_clear();
        if let Some(line) =
            render_phase_line(self.renderer.style, phase.label(), ok, started_at.elapsed())
        {
            println!("{line}");
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn render_phase_line(
    style: OutputStyle,
    label: &str,
    ok: bool,
    elapsed: Duration,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }
    let status = if ok { "ok" } else { "err" };
    Some(render_status_line(
        style,
        status,
        &format!("{label} ({})", format_elapsed(elapsed)),
    ))
}

/// Diagnostics of every failing check, informational notes, then the gate
/// verdict.
pub(crate) fn format_gate_lines(report: &GateReport, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for finding in report.blockers() {
        for message in &finding.messages {
            lines.push(render_status_line(style, "err", message));
        }
    }
    for finding in report
        .findings
        .iter()
        .filter(|finding| finding.kind == FindingKind::Info)
    {
        for message in &finding.messages {
            lines.push(render_status_line(style, "warn", message));
        }
    }

    if report.passed() {
        lines.push(render_status_line(style, "ok", GATE_PASSED_LINE));
    } else {
        lines.push(render_status_line(style, "err", GATE_FAILED_LINE));
    }
    lines
}

pub(crate) fn format_prerequisite_lines(descriptions: &[String]) -> Vec<String> {
    let mut lines = vec!["=== Virtuozzo-specific upgrade prerequisites: ===".to_string()];
    lines.extend(descriptions.iter().map(|description| format!("* {description}")));
    lines
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
