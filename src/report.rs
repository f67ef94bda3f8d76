//! JSON run report.
//!
//! Written once per run when `--report` is given: what was built, how it was
//! configured and how every announced stage exited.

use crate::pipeline::{BuildConfig, PipelineOutcome};
use crate::stage::StageRecord;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: String,
    pub exit_code: i32,
    pub created_at_utc: String,
    pub finished_at_utc: String,
    pub identity: String,
    pub latest_identity: Option<String>,
    pub release: bool,
    pub push: bool,
    pub dry_run: bool,
    /// Label of the failed stage, if any.
    pub failed_stage: Option<String>,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    pub fn new(
        config: &BuildConfig,
        dry_run: bool,
        created_at_utc: String,
        outcome: Option<&PipelineOutcome>,
        stages: Vec<StageRecord>,
    ) -> Result<Self> {
        let (status, exit_code, failed_stage) = match outcome {
            Some(PipelineOutcome::Completed) => ("success", 0, None),
            Some(PipelineOutcome::Failed { label, code, .. }) => {
                ("failed", *code, Some(label.clone()))
            }
            None => ("failed", 1, None),
        };
        Ok(Self {
            status: status.to_string(),
            exit_code,
            created_at_utc,
            finished_at_utc: now_utc_compact()?,
            identity: config.identity(),
            latest_identity: config.latest_identity(),
            release: config.release,
            push: config.push,
            dry_run,
            failed_stage,
            stages,
        })
    }
}

/// Current UTC time as `YYYYMMDDTHHMMSSZ`.
pub fn now_utc_compact() -> Result<String> {
    let now = OffsetDateTime::now_utc();
    Ok(format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    ))
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    write_json_atomic(path, report)
        .with_context(|| format!("writing run report '{}'", path.display()))
}

pub fn read_report(path: &Path) -> Result<RunReport> {
    let bytes =
        fs::read(path).with_context(|| format!("reading run report '{}'", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing run report '{}'", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("path without parent '{}'", path.display())),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).with_context(|| "serializing run report")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}
