use std::fmt;
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{anyhow, Context, Result};

/// Exit status of an external tool, reduced to what the orchestrator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
}

impl CommandStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn code(self) -> Option<i32> {
        self.code
    }

    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the orchestrator and the external tools it drives.
pub trait CommandRunner {
    /// Runs with inherited stdio and waits for completion.
    fn run(&mut self, command: &mut Command) -> Result<CommandStatus>;

    /// Runs with stdout and stderr captured.
    fn capture(&mut self, command: &mut Command) -> Result<CapturedOutput>;

    /// Replaces the current process with `command`. The system runner only
    /// returns when the exec itself failed.
    fn replace_process(&mut self, command: &mut Command) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, command: &mut Command) -> Result<CommandStatus> {
        (**self).run(command)
    }

    fn capture(&mut self, command: &mut Command) -> Result<CapturedOutput> {
        (**self).capture(command)
    }

    fn replace_process(&mut self, command: &mut Command) -> Result<()> {
        (**self).replace_process(command)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &mut Command) -> Result<CommandStatus> {
        tracing::debug!(command = %describe_command(command), "running");
        let status = command
            .status()
            .with_context(|| format!("failed to start {}", describe_command(command)))?;
        Ok(status.into())
    }

    fn capture(&mut self, command: &mut Command) -> Result<CapturedOutput> {
        tracing::debug!(command = %describe_command(command), "capturing");
        let output = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {}", describe_command(command)))?;
        Ok(CapturedOutput {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn replace_process(&mut self, command: &mut Command) -> Result<()> {
        tracing::info!(command = %describe_command(command), "replacing process");
        let err = command.exec();
        Err(err).with_context(|| format!("failed to exec {}", describe_command(command)))
    }
}

/// Captures `command` and returns its stdout, failing on a non-zero exit.
pub fn capture_stdout(
    runner: &mut dyn CommandRunner,
    command: &mut Command,
    context_message: &str,
) -> Result<String> {
    let output = runner
        .capture(command)
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(output.stdout);
    }

    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        output.stdout.trim(),
        output.stderr.trim()
    ))
}

pub fn describe_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}
