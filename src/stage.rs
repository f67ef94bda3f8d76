//! Stage numbering and progress output.
//!
//! [`StageTracker`] only prints; it never influences control flow. A quiet
//! tracker still counts, so stage numbers in run reports stay stable.

use crate::process::{CommandOutcome, CommandRunner, CommandSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Counts and announces build stages.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: usize,
    quiet: bool,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker that counts but prints nothing (headless runs, tests).
    pub fn quiet() -> Self {
        Self {
            current: 0,
            quiet: true,
        }
    }

    /// Number of the most recently announced stage (0 before the first).
    pub fn current(&self) -> usize {
        self.current
    }

    /// Advance to the next stage and announce it. Returns the new stage number.
    pub fn stage(&mut self, label: &str, detail: &str) -> usize {
        self.current += 1;
        if !self.quiet {
            if self.current > 1 {
                println!();
            }
            print!("{}", banner(self.current, label, detail));
        }
        self.current
    }
}

/// Render the announcement for one stage.
pub fn banner(number: usize, label: &str, detail: &str) -> String {
    format!("-----> Stage {number}: {label}\n       {detail}\n")
}

/// Outcome of one announced command, kept for the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub number: usize,
    pub label: String,
    pub command: String,
    /// `None` when the command could not be started.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// A [`CommandRunner`] paired with a [`StageTracker`].
///
/// Every command issued through it becomes a numbered stage, including the
/// environment's own pull/start/remove commands.
pub struct StagedRunner<R> {
    runner: R,
    tracker: StageTracker,
    records: Vec<StageRecord>,
}

impl<R: CommandRunner> StagedRunner<R> {
    pub fn new(runner: R, tracker: StageTracker) -> Self {
        Self {
            runner,
            tracker,
            records: Vec::new(),
        }
    }

    pub fn run(&mut self, label: &str, command: &CommandSpec) -> Result<CommandOutcome> {
        let line = command.to_string();
        let number = self.tracker.stage(label, &line);
        let start = Instant::now();
        let result = self.runner.run(command);
        self.records.push(StageRecord {
            number,
            label: label.to_string(),
            command: line,
            exit_code: result.as_ref().ok().map(|outcome| outcome.code),
            duration_ms: start.elapsed().as_millis() as u64,
        });
        result
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn into_parts(self) -> (R, Vec<StageRecord>) {
        (self.runner, self.records)
    }
}
