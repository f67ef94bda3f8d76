//! Ctrl-C during a stage still removes the builder container.

#![cfg(unix)]

mod common;

use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_for_line(log: &std::path::Path, needle: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        if fs::read_to_string(log).is_ok_and(|calls| calls.contains(needle)) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn sigint_during_stage_releases_builder() {
    let source = TempDir::new().unwrap();
    fs::create_dir_all(source.path().join("plugin")).unwrap();
    fs::write(source.path().join("config.json"), "{}").unwrap();

    let bin = TempDir::new().unwrap();
    let log = bin.path().join("docker.log");

    let child = Command::new(env!("CARGO_BIN_EXE_gcsfs-plugin-builder"))
        .env("PATH", common::install_fake_docker(bin.path()))
        .env("FAKE_DOCKER_LOG", &log)
        .env("FAKE_DOCKER_SLOW", "docker build")
        .env("FAKE_DOCKER_SLEEP", "3")
        .env_remove("GCSFS_BUILDER_RUNTIME")
        .env_remove("RUST_LOG")
        .args(["-q", "-n", "--source"])
        .arg(source.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    assert!(wait_for_line(&log, "docker build"), "build stage never started");
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(130), "stderr: {stderr}");
    assert!(stderr.contains("error: interrupted"));

    let calls = fs::read_to_string(&log).unwrap();
    assert!(!calls.contains("docker export"), "stages ran after the interrupt");
    assert_eq!(calls.lines().last(), Some("rm -v -f gcsfs-builder"));
}
