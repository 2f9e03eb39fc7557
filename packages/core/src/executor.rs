//! Command execution abstraction.
//!
//! Every external program the driver touches (the container runtime, `git`,
//! `mount`, `findmnt`) is run through [`CommandRunner`], so backends and the
//! supervisor can be exercised against recorded fakes.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::error::{Error, IoResultExt, Result};

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was killed by a signal.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns true when the command exited with status zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Standard output followed by standard error, like a combined stream.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }

    /// Converts a non-zero exit into [`Error::CommandExit`].
    pub fn checked(self, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::CommandExit {
            command: command.to_string(),
            code: self.code,
            output: self.combined(),
        })
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Runs external programs and captures their output.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to finish.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Runs `program` with `args`, writing `input` to its standard input.
    fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<CommandOutput>;
}

/// Execution context for running real system commands.
///
/// # Example
///
/// ```no_run
/// use flexmount_core::executor::{CommandRunner, ExecutionContext};
///
/// let ctx = ExecutionContext::new();
/// let output = ctx.run("findmnt", &["-n", "/mnt"]).unwrap();
/// println!("{}", output.stdout);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionContext;

impl ExecutionContext {
    /// Creates a context that runs commands in the current directory.
    pub fn new() -> Self {
        Self
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd
    }
}

impl CommandRunner for ExecutionContext {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(target: "flexmount::exec", program, ?args, "running command");
        self.command(program, args)
            .stdin(Stdio::null())
            .output()
            .map(CommandOutput::from)
            .command_context(program)
    }

    fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
        tracing::debug!(target: "flexmount::exec", program, ?args, "running command with input");
        let mut child = self
            .command(program, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .command_context(program)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).command_context(program)?;
        }

        child
            .wait_with_output()
            .map(CommandOutput::from)
            .command_context(program)
    }
}
