//! Staged builder for the gcsfs Docker volume plugin.
//!
//! The build runs inside a disposable, privileged Docker-in-Docker container so
//! that the host only needs a Docker daemon:
//!
//! - **Workspace snapshot** - a filtered copy of the source tree to bind-mount
//! - **Build environment** - the builder container, removed on every exit path
//! - **Pipeline** - compile the rootfs image, export and unpack it, create and
//!   inspect the plugin, optionally publish it
//! - **Stage tracking** - numbered progress output and a JSON run report
//!
//! # Architecture
//!
//! ```text
//! config ──> WorkspaceSnapshot ──> BuildEnvironment::acquire
//!                                        │
//!                         pipeline::run_steps (stop at first non-zero)
//!                                        │
//!                               BuildEnvironment::release
//! ```
//!
//! Every command goes through a [`process::CommandRunner`], so the whole
//! pipeline can be exercised with a [`process::RecordingRunner`] instead of a
//! Docker daemon.
//!
//! # Example
//!
//! ```rust,no_run
//! use gcsfs_plugin_builder::pipeline::{self, config};
//! use gcsfs_plugin_builder::process::HostRunner;
//! use gcsfs_plugin_builder::snapshot::WorkspaceSnapshot;
//! use gcsfs_plugin_builder::stage::{StageTracker, StagedRunner};
//! use std::path::Path;
//!
//! let config = config::resolve(None, &config::ConfigOverrides::default())?;
//! let snapshot = WorkspaceSnapshot::stage(Path::new("."))?;
//! let mut runner = StagedRunner::new(HostRunner, StageTracker::new());
//! let outcome = pipeline::execute(&mut runner, &config, snapshot.root())?;
//! std::process::exit(outcome.exit_code());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod environment;
pub mod interrupt;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod report;
pub mod snapshot;
pub mod stage;

pub use environment::{BuildEnvironment, EnvironmentSpec, ExecOptions};
pub use pipeline::{BuildConfig, PipelineOutcome};
pub use process::{CommandOutcome, CommandRunner, CommandSpec};
