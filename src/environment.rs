//! Disposable Docker-in-Docker build environment.
//!
//! A [`BuildEnvironment`] is a privileged builder container with the staged
//! workspace bind-mounted at [`WORK_DIR`]. Holding one means the container is
//! running; dropping or releasing it removes the container together with its
//! anonymous volumes. Release happens exactly once on every exit path:
//! [`BuildEnvironment::release`] consumes the handle, and `Drop` covers early
//! returns and unwinding.
//!
//! Stage commands carry their working directory explicitly (`docker exec -w`),
//! so nothing in this process changes directory while the environment is up.
//!
//! ```text
//! Unprovisioned ─acquire─> Acquiring ─ok──> Ready <─> RunningStage
//!                              │              │
//!                              └─err─> FailedAcquisition (container removed)
//!                                             │
//!                                   release / drop
//!                                             v
//!                                   Releasing ─> Released
//! ```

use crate::process::{CommandOutcome, CommandRunner, CommandSpec};
use crate::stage::StagedRunner;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

/// Mount point of the staged workspace inside the builder container.
pub const WORK_DIR: &str = "/home";

/// Lifecycle position of a build environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Unprovisioned,
    Acquiring,
    Ready,
    RunningStage,
    Releasing,
    Released,
    FailedAcquisition,
}

/// What to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Container runtime binary (`docker`).
    pub runtime: String,
    /// Builder image, e.g. `docker:stable-dind`.
    pub image: String,
    /// Fixed container name; at most one builder with this name may exist.
    pub name: String,
    /// Host directory bind-mounted at [`WORK_DIR`].
    pub host_dir: PathBuf,
}

impl EnvironmentSpec {
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        name: impl Into<String>,
        host_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            name: name.into(),
            host_dir: host_dir.into(),
        }
    }

    fn pull_command(&self) -> CommandSpec {
        CommandSpec::new(&self.runtime).args(["pull", self.image.as_str()])
    }

    fn start_command(&self) -> CommandSpec {
        CommandSpec::new(&self.runtime).args([
            "run".to_string(),
            "-d".to_string(),
            "--privileged".to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_dir.display(), WORK_DIR),
            "--name".to_string(),
            self.name.clone(),
            self.image.clone(),
        ])
    }

    fn remove_command(&self) -> CommandSpec {
        CommandSpec::new(&self.runtime).args(["rm", "-v", "-f", self.name.as_str()])
    }
}

/// Options for one command run inside the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Working directory inside the container. `None` leaves the image default.
    pub workdir: Option<String>,
    /// Allocate a TTY and keep stdin open (`-it`).
    pub interactive: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            workdir: Some(WORK_DIR.to_string()),
            interactive: false,
        }
    }
}

impl ExecOptions {
    /// Run in the image's default working directory.
    pub fn no_chdir() -> Self {
        Self {
            workdir: None,
            interactive: false,
        }
    }

    /// Run attached to the terminal, in [`WORK_DIR`].
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }
}

/// A running builder container. See the module docs for the lifecycle.
pub struct BuildEnvironment<'a, R: CommandRunner> {
    runner: &'a mut StagedRunner<R>,
    spec: EnvironmentSpec,
    state: EnvironmentState,
}

impl<'a, R: CommandRunner> BuildEnvironment<'a, R> {
    /// Pull the builder image and start the builder container.
    ///
    /// If either step fails, any partially created container is removed
    /// before the error is returned, so a later attempt starts clean.
    pub fn acquire(runner: &'a mut StagedRunner<R>, spec: EnvironmentSpec) -> Result<Self> {
        tracing::debug!(
            name = %spec.name,
            image = %spec.image,
            state = ?EnvironmentState::Acquiring,
            "acquiring build environment"
        );

        if let Err(err) = provision(runner, &spec) {
            if let Err(cleanup) = remove(runner, &spec) {
                tracing::warn!(name = %spec.name, "cleanup after failed acquisition: {cleanup:#}");
            }
            tracing::debug!(
                name = %spec.name,
                state = ?EnvironmentState::FailedAcquisition,
                "build environment not acquired"
            );
            return Err(err.context(format!(
                "acquiring build environment '{}' from image '{}'",
                spec.name, spec.image
            )));
        }

        tracing::debug!(name = %spec.name, "build environment ready");
        Ok(Self {
            runner,
            spec,
            state: EnvironmentState::Ready,
        })
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn spec(&self) -> &EnvironmentSpec {
        &self.spec
    }

    /// The host command that runs `command` inside the container.
    pub fn exec_command(&self, command: &[String], options: &ExecOptions) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.spec.runtime).arg("exec");
        if let Some(workdir) = &options.workdir {
            cmd = cmd.args(["-w", workdir.as_str()]);
        }
        if options.interactive {
            cmd = cmd.arg("-it");
        }
        cmd.arg(&self.spec.name)
            .args(command.iter().cloned())
            .interactive(options.interactive)
    }

    /// Run `command` inside the container and wait for it.
    pub fn exec(
        &mut self,
        label: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> Result<CommandOutcome> {
        if self.state != EnvironmentState::Ready {
            bail!(
                "build environment '{}' is not ready (state: {:?})",
                self.spec.name,
                self.state
            );
        }
        let cmd = self.exec_command(command, options);
        self.state = EnvironmentState::RunningStage;
        let result = self.runner.run(label, &cmd);
        self.state = EnvironmentState::Ready;
        result
    }

    /// Remove the container and its volumes.
    pub fn release(mut self) -> Result<()> {
        self.release_once()
    }

    fn release_once(&mut self) -> Result<()> {
        if self.state == EnvironmentState::Released {
            return Ok(());
        }
        self.state = EnvironmentState::Releasing;
        let result = remove(self.runner, &self.spec);
        self.state = EnvironmentState::Released;
        tracing::debug!(name = %self.spec.name, ok = result.is_ok(), "build environment released");
        result
    }
}

impl<R: CommandRunner> Drop for BuildEnvironment<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.release_once() {
            tracing::warn!(name = %self.spec.name, "releasing build environment: {err:#}");
        }
    }
}

fn provision<R: CommandRunner>(runner: &mut StagedRunner<R>, spec: &EnvironmentSpec) -> Result<()> {
    require_success(
        runner.run("pull builder image", &spec.pull_command())?,
        "pulling builder image",
    )?;
    require_success(
        runner.run("start builder", &spec.start_command())?,
        "starting builder container",
    )
}

/// Forced removal. A container that does not exist is not an error for the
/// runtime (`rm -f`), so this is safe to call after a failed start.
fn remove<R: CommandRunner>(runner: &mut StagedRunner<R>, spec: &EnvironmentSpec) -> Result<()> {
    require_success(
        runner.run("remove builder", &spec.remove_command())?,
        "removing builder container",
    )
}

fn require_success(outcome: CommandOutcome, what: &str) -> Result<()> {
    if outcome.success() {
        Ok(())
    } else {
        Err(anyhow!("{} failed with exit code {}", what, outcome.code))
    }
}
