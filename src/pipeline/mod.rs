//! Plugin build pipeline.
//!
//! - [`config`] - run configuration (defaults, TOML file, CLI overrides)
//! - [`plan`] - the ordered list of stages for a configuration
//! - [`paths`] - fixed locations inside the builder container
//!
//! [`execute`] acquires the build environment, runs every planned stage in
//! order and stops at the first one that exits non-zero. The environment is
//! released on every path out of [`execute`].

pub mod config;
pub mod paths;
pub mod plan;

use crate::environment::{BuildEnvironment, EnvironmentSpec};
use crate::process::CommandRunner;
use crate::stage::StagedRunner;
use anyhow::Result;
use std::path::Path;

pub use config::BuildConfig;
pub use plan::{build_steps, Step, StepKind};

/// Final result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every planned stage exited 0.
    Completed,
    /// A stage exited non-zero; later stages never ran.
    Failed {
        /// 1-based position in the plan.
        step: usize,
        label: String,
        command: String,
        code: i32,
    },
}

impl PipelineOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineOutcome::Completed => 0,
            PipelineOutcome::Failed { code, .. } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed)
    }
}

/// Environment for `config`, mounting `host_dir`.
pub fn environment_spec(config: &BuildConfig, host_dir: &Path) -> EnvironmentSpec {
    EnvironmentSpec::new(
        &config.runtime,
        &config.builder_image,
        config.builder_container(),
        host_dir,
    )
}

/// Run `steps` in order inside `env`, stopping at the first failure.
pub fn run_steps<R: CommandRunner>(
    env: &mut BuildEnvironment<'_, R>,
    steps: &[Step],
) -> Result<PipelineOutcome> {
    for (index, step) in steps.iter().enumerate() {
        let outcome = env.exec(&step.label, &step.command, &step.options)?;
        if !outcome.success() {
            return Ok(PipelineOutcome::Failed {
                step: index + 1,
                label: step.label.clone(),
                command: step.command.join(" "),
                code: outcome.code,
            });
        }
    }
    Ok(PipelineOutcome::Completed)
}

/// Acquire the environment, run the plan for `config`, release the environment.
///
/// A stage failure is `Ok(PipelineOutcome::Failed)`. Errors are reserved for
/// acquisition failures, commands that could not be started and, when every
/// stage succeeded, a failed release. A release failure after a failed stage
/// is logged and the stage failure is returned.
pub fn execute<R: CommandRunner>(
    runner: &mut StagedRunner<R>,
    config: &BuildConfig,
    host_dir: &Path,
) -> Result<PipelineOutcome> {
    let steps = build_steps(config);
    let mut env = BuildEnvironment::acquire(runner, environment_spec(config, host_dir))?;

    let outcome = run_steps(&mut env, &steps);
    let released = env.release();

    match (outcome, released) {
        (outcome, Ok(())) => outcome,
        (Ok(PipelineOutcome::Completed), Err(err)) => Err(err),
        (Ok(failed), Err(err)) => {
            tracing::warn!("releasing build environment after failed stage: {err:#}");
            Ok(failed)
        }
        (Err(stage_err), Err(err)) => {
            tracing::warn!("releasing build environment after error: {err:#}");
            Err(stage_err)
        }
    }
}
