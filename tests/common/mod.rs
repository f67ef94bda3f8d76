//! A stateful stand-in for the Docker CLI.
//!
//! Tracks which containers exist so start/remove behave like the real runtime:
//! starting a container whose name is taken fails, `rm -f` always succeeds.

#![allow(dead_code)]

use anyhow::Result;
use gcsfs_plugin_builder::process::{CommandOutcome, CommandRunner, CommandSpec};
use std::collections::{BTreeSet, HashMap};

pub const BUILDER: &str = "gcsfs-builder";

#[derive(Debug, Default)]
pub struct FakeDocker {
    pub containers: BTreeSet<String>,
    pub commands: Vec<CommandSpec>,
    pub pull_code: i32,
    /// 1-based exec number -> exit code.
    pub exec_failures: HashMap<usize, i32>,
    /// Panic on this 1-based exec number (once).
    pub panic_on_exec: Option<usize>,
    execs: usize,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_exec(exec: usize, code: i32) -> Self {
        let mut fake = Self::new();
        fake.exec_failures.insert(exec, code);
        fake
    }

    pub fn with_container(mut self, name: &str) -> Self {
        self.containers.insert(name.to_string());
        self
    }

    pub fn exec_count(&self) -> usize {
        self.execs
    }

    pub fn removals(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| cmd.args.first().map(String::as_str) == Some("rm"))
            .count()
    }

    /// Commands run inside the builder, without the `docker exec` prefix.
    pub fn inner_commands(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|cmd| cmd.args.first().map(String::as_str) == Some("exec"))
            .filter_map(|cmd| {
                let name = cmd.args.iter().position(|arg| arg == BUILDER)?;
                Some(cmd.args[name + 1..].join(" "))
            })
            .collect()
    }

    fn exec(&mut self) -> i32 {
        self.execs += 1;
        if self.panic_on_exec == Some(self.execs) {
            self.panic_on_exec = None;
            panic!("runtime crashed during exec {}", self.execs);
        }
        if !self.containers.contains(BUILDER) {
            return 1;
        }
        self.exec_failures.get(&self.execs).copied().unwrap_or(0)
    }
}

impl CommandRunner for FakeDocker {
    fn run(&mut self, command: &CommandSpec) -> Result<CommandOutcome> {
        self.commands.push(command.clone());
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();

        let code = match args.first().copied() {
            Some("pull") => self.pull_code,
            Some("run") => {
                let name = args
                    .iter()
                    .position(|arg| *arg == "--name")
                    .and_then(|at| args.get(at + 1))
                    .map(|name| name.to_string())
                    .unwrap_or_default();
                if self.containers.insert(name) {
                    0
                } else {
                    125
                }
            }
            Some("rm") => {
                if let Some(name) = args.last() {
                    self.containers.remove(*name);
                }
                0
            }
            Some("exec") => self.exec(),
            _ => 0,
        };

        Ok(CommandOutcome::from_code(code))
    }
}

/// Shell stand-in for the `docker` binary, for driving the real CLI.
///
/// Appends its arguments to `$FAKE_DOCKER_LOG`. A command line containing
/// `$FAKE_DOCKER_FAIL` exits with `$FAKE_DOCKER_CODE`; one containing
/// `$FAKE_DOCKER_SLOW` sleeps `$FAKE_DOCKER_SLEEP` seconds first.
#[cfg(unix)]
pub const FAKE_DOCKER_SCRIPT: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_DOCKER_LOG"
if [ -n "$FAKE_DOCKER_SLOW" ]; then
    case "$*" in *"$FAKE_DOCKER_SLOW"*) sleep "${FAKE_DOCKER_SLEEP:-3}" ;; esac
fi
if [ -n "$FAKE_DOCKER_FAIL" ]; then
    case "$*" in *"$FAKE_DOCKER_FAIL"*) exit "${FAKE_DOCKER_CODE:-1}" ;; esac
fi
exit 0
"#;

/// Write the fake `docker` into `bin_dir` and return a `PATH` that finds it
/// first.
#[cfg(unix)]
pub fn install_fake_docker(bin_dir: &std::path::Path) -> std::ffi::OsString {
    use std::os::unix::fs::PermissionsExt;

    let docker = bin_dir.join("docker");
    std::fs::write(&docker, FAKE_DOCKER_SCRIPT).unwrap();
    std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut paths = vec![bin_dir.to_path_buf()];
    if let Some(current) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&current));
    }
    std::env::join_paths(paths).unwrap()
}
