//! External command execution.
//!
//! Every build stage is an external command. A runner reports how the command
//! exited as a [`CommandOutcome`]; a non-zero exit code is an ordinary value the
//! caller branches on. Only a command that cannot be started at all (missing
//! binary, spawn failure) is returned as an error.
//!
//! # Example
//!
//! ```rust,no_run
//! use gcsfs_plugin_builder::process::{CommandRunner, CommandSpec, HostRunner};
//!
//! let mut runner = HostRunner;
//! let outcome = runner.run(&CommandSpec::new("docker").args(["version"]))?;
//! if !outcome.success() {
//!     eprintln!("docker exited with {}", outcome.code);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name (resolved through `PATH`) or path.
    pub program: String,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Host working directory for the child. `None` inherits ours.
    pub current_dir: Option<PathBuf>,
    /// Attach the terminal's stdin so the command can prompt.
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a command exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code. Termination by signal is reported as `-1`.
    pub code: i32,
}

impl CommandOutcome {
    pub const SUCCESS: CommandOutcome = CommandOutcome { code: 0 };

    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Something that can run a [`CommandSpec`] to completion.
pub trait CommandRunner {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome> {
        (**self).run(command)
    }
}

/// Runs commands on the host, synchronously.
///
/// Output is streamed straight to our stdout/stderr. Stdin is only attached
/// for interactive commands (registry login prompts).
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome> {
        let program = which::which(&command.program)
            .with_context(|| format!("command not found: {}", command.program))?;

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if command.interactive {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program = %program.display(), "running {}", command);
        let status = cmd
            .status()
            .with_context(|| format!("Failed to execute: {}", command))?;

        let outcome = CommandOutcome::from_code(status.code().unwrap_or(-1));
        tracing::debug!(code = outcome.code, "finished {}", command.program);
        Ok(outcome)
    }
}

/// Records commands instead of running them.
///
/// Every command succeeds unless a failure was scripted for its call index
/// with [`RecordingRunner::fail_call`]. Used for `--dry-run`.
#[derive(Debug, Default, Clone)]
pub struct RecordingRunner {
    commands: Vec<CommandSpec>,
    scripted: Vec<(usize, i32)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `call`-th command (0-based) exit with `code`.
    pub fn fail_call(mut self, call: usize, code: i32) -> Self {
        self.scripted.push((call, code));
        self
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome> {
        let call = self.commands.len();
        self.commands.push(command.clone());
        let code = self
            .scripted
            .iter()
            .find(|(index, _)| *index == call)
            .map(|(_, code)| *code)
            .unwrap_or(0);
        Ok(CommandOutcome::from_code(code))
    }
}
