use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gcsfs_plugin_builder::interrupt::{self, Interrupt, InterruptibleRunner};
use gcsfs_plugin_builder::pipeline::config::{self, ConfigOverrides};
use gcsfs_plugin_builder::pipeline::{self, BuildConfig, PipelineOutcome};
use gcsfs_plugin_builder::preflight;
use gcsfs_plugin_builder::process::{CommandRunner, HostRunner, RecordingRunner};
use gcsfs_plugin_builder::report::{self, RunReport};
use gcsfs_plugin_builder::snapshot::WorkspaceSnapshot;
use gcsfs_plugin_builder::stage::{StageTracker, StagedRunner};
use tracing_subscriber::EnvFilter;

/// Build the gcsfs Docker volume plugin inside a disposable Docker-in-Docker builder
#[derive(Parser, Debug)]
#[command(name = "gcsfs-plugin-builder")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Skip the publishing stage
    #[arg(short = 'n', long)]
    no_push: bool,

    /// Maximize image size optimization and tag latest
    #[arg(short, long)]
    release: bool,

    /// Run linters
    #[arg(short, long)]
    lint: bool,

    /// The desired tag (default: 1.0.0)
    #[arg(short = 't', long = "tag")]
    tag: Option<String>,

    /// The version or commit hash of gcsfuse (default: 0.27.0)
    #[arg(short = 'g', long = "gcsfuse")]
    gcsfuse: Option<String>,

    /// The builder image (default: docker:stable-dind)
    #[arg(short = 'b', long = "builder")]
    builder: Option<String>,

    /// Container runtime binary (default: docker)
    #[arg(long, env = "GCSFS_BUILDER_RUNTIME")]
    runtime: Option<String>,

    /// TOML file with a [build] table
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Plugin source tree to stage into the builder
    #[arg(short = 's', long, default_value = ".")]
    source: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the stages without running anything
    #[arg(long)]
    dry_run: bool,

    /// Do not print stage banners
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let interrupt = match Interrupt::install() {
        Ok(interrupt) => interrupt,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cli, &interrupt);
    if let Err(err) = &result {
        eprintln!("error: {err:#}");
    }
    if interrupt.is_set() {
        eprintln!("error: interrupted");
        return exit_code(interrupt::EXIT_CODE);
    }
    match result {
        Ok(code) => exit_code(code),
        Err(_) => ExitCode::FAILURE,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}

fn run(cli: &Cli, interrupt: &Interrupt) -> Result<i32> {
    let overrides = ConfigOverrides {
        tag: cli.tag.clone(),
        gcsfuse_version: cli.gcsfuse.clone(),
        builder_image: cli.builder.clone(),
        runtime: cli.runtime.clone(),
        release: cli.release,
        lint: cli.lint,
        no_push: cli.no_push,
    };
    let config = config::resolve(cli.config.as_deref(), &overrides)?;
    tracing::debug!(?config, "resolved build configuration");

    if !cli.dry_run {
        preflight::check_runtime(&config.runtime)?;
    }

    let snapshot = WorkspaceSnapshot::stage(&cli.source)
        .with_context(|| format!("staging workspace from '{}'", cli.source.display()))?;
    if interrupt.is_set() {
        bail!("interrupted before the builder was started");
    }

    let tracker = if cli.quiet {
        StageTracker::quiet()
    } else {
        StageTracker::new()
    };

    if cli.dry_run {
        let runner = InterruptibleRunner::new(RecordingRunner::new(), interrupt.clone());
        drive(runner, tracker, &config, snapshot.root(), cli)
    } else {
        let runner = InterruptibleRunner::new(HostRunner, interrupt.clone());
        drive(runner, tracker, &config, snapshot.root(), cli)
    }
}

fn drive<R: CommandRunner>(
    runner: R,
    tracker: StageTracker,
    config: &BuildConfig,
    host_dir: &Path,
    cli: &Cli,
) -> Result<i32> {
    let created_at_utc = report::now_utc_compact()?;
    let mut staged = StagedRunner::new(runner, tracker);
    let result = pipeline::execute(&mut staged, config, host_dir);
    let (_, records) = staged.into_parts();

    if let Some(path) = &cli.report {
        let written = RunReport::new(
            config,
            cli.dry_run,
            created_at_utc,
            result.as_ref().ok(),
            records,
        )
        .and_then(|run_report| report::write_report(path, &run_report));
        if let Err(err) = written {
            if matches!(result, Ok(PipelineOutcome::Completed)) {
                return Err(err);
            }
            tracing::warn!("{err:#}");
        }
    }

    let outcome = result?;
    match &outcome {
        PipelineOutcome::Completed => {
            if !cli.quiet {
                println!();
                if cli.dry_run {
                    println!("Dry run complete for {}", config.identity());
                } else {
                    println!("Built {}", config.identity());
                }
            }
        }
        PipelineOutcome::Failed {
            label,
            command,
            code,
            ..
        } => {
            eprintln!();
            eprintln!("error: stage '{label}' failed with exit code {code}");
            eprintln!("       {command}");
        }
    }

    Ok(outcome.exit_code())
}
