//! Ctrl-C / SIGTERM handling for a running pipeline.
//!
//! The terminal delivers SIGINT to the whole foreground process group, so the
//! stage command already receives it. The driver only records the signal and
//! keeps going: the stage returns, the pipeline short-circuits, and the builder
//! container is released before the process exits with [`EXIT_CODE`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::process::{CommandOutcome, CommandRunner, CommandSpec};

/// Exit status for an interrupted run (128 + SIGINT).
pub const EXIT_CODE: i32 = 130;

/// Shared "an interrupt arrived" flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    received: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag that only [`Interrupt::trigger`] sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default SIGINT/SIGTERM action with setting this flag.
    pub fn install() -> Result<Self> {
        let interrupt = Self::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&interrupt.received))
                .with_context(|| format!("installing handler for signal {signal}"))?;
        }
        Ok(interrupt)
    }

    pub fn trigger(&self) {
        self.received.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }
}

/// Reports the first command that finishes after an interrupt as exit code
/// [`EXIT_CODE`], whatever the command itself returned.
///
/// Later commands (the environment release) report their real outcome.
#[derive(Debug)]
pub struct InterruptibleRunner<R> {
    inner: R,
    interrupt: Interrupt,
    reported: bool,
}

impl<R: CommandRunner> InterruptibleRunner<R> {
    pub fn new(inner: R, interrupt: Interrupt) -> Self {
        Self {
            inner,
            interrupt,
            reported: false,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: CommandRunner> CommandRunner for InterruptibleRunner<R> {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome> {
        let outcome = self.inner.run(command)?;
        if !self.reported && self.interrupt.is_set() {
            self.reported = true;
            tracing::warn!(code = outcome.code, "interrupted while running {}", command);
            return Ok(CommandOutcome::from_code(EXIT_CODE));
        }
        Ok(outcome)
    }
}
