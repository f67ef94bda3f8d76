//! Host checks run before the workspace is staged.
//!
//! The only host dependency is the container runtime binary; everything else
//! runs inside the builder image. A missing runtime is reported here with an
//! install hint rather than as a failed first stage.
//!
//! ```rust
//! use gcsfs_plugin_builder::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("docker") {
//!     println!("docker not installed");
//! }
//! if let Err(e) = check_required_tools(&[("docker", "docker-ce or docker.io")]) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Context, Result};

/// Whether `cmd` resolves on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Install hint for a container runtime binary.
pub fn runtime_package(runtime: &str) -> &'static str {
    match runtime {
        "docker" => "docker-ce or docker.io",
        "podman" => "podman",
        _ => "a Docker-compatible container runtime",
    }
}

/// Fail with one line per `(binary, install hint)` pair not found on `PATH`.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(binary, _)| !command_exists(binary))
        .map(|(binary, hint)| format!("  {binary}: install {hint}"))
        .collect();

    if !missing.is_empty() {
        bail!("not found on PATH:\n{}", missing.join("\n"));
    }
    Ok(())
}

/// Check the configured runtime (`docker` unless overridden) before anything
/// is pulled or staged.
pub fn check_runtime(runtime: &str) -> Result<()> {
    check_required_tools(&[(runtime, runtime_package(runtime))])
        .with_context(|| format!("container runtime '{runtime}' is unavailable"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_missing_tools_listed_with_hints() {
        let err = check_required_tools(&[("sh", "dash"), ("no_such_tool_12345", "tool-pkg")])
            .unwrap_err();
        assert_eq!(err.to_string(), "not found on PATH:\n  no_such_tool_12345: install tool-pkg");
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_runtime_names_package() {
        let err = check_runtime("definitely_not_a_runtime_12345").unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("container runtime 'definitely_not_a_runtime_12345' is unavailable"));
        assert!(msg.contains("definitely_not_a_runtime_12345: install a Docker-compatible"));
    }
}
