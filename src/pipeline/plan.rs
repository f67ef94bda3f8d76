use crate::environment::ExecOptions;
use crate::pipeline::config::BuildConfig;
use crate::pipeline::paths::{
    BUILD_CONTEXT, BUILD_DIR, DOCKERFILE, EXPORT_ARCHIVE, PLUGIN_CONFIG, ROOTFS_DIR,
};

/// One build stage, before it is rendered to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    PrepareDirs,
    CopyPluginConfig,
    BuildRootfsImage,
    CreateRootfsContainer,
    ExportRootfs,
    ExtractRootfs,
    CreatePlugin { identity: String },
    InspectPlugin { identity: String },
    Login,
    PushPlugin { identity: String },
}

/// A rendered stage: what to run inside the environment and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub label: String,
    pub command: Vec<String>,
    pub options: ExecOptions,
}

/// Ordered stages for `config`.
///
/// Release builds also create, inspect and push the `latest` identity.
/// Publishing (login + push) is only planned when `config.push` is set.
pub fn build_steps(config: &BuildConfig) -> Vec<Step> {
    let identity = config.identity();
    let latest = config.latest_identity();

    let mut kinds = vec![
        StepKind::PrepareDirs,
        StepKind::CopyPluginConfig,
        StepKind::BuildRootfsImage,
        StepKind::CreateRootfsContainer,
        StepKind::ExportRootfs,
        StepKind::ExtractRootfs,
        StepKind::CreatePlugin {
            identity: identity.clone(),
        },
        StepKind::InspectPlugin {
            identity: identity.clone(),
        },
    ];

    if let Some(latest) = &latest {
        kinds.push(StepKind::CreatePlugin {
            identity: latest.clone(),
        });
        kinds.push(StepKind::InspectPlugin {
            identity: latest.clone(),
        });
    }

    if config.push {
        kinds.push(StepKind::Login);
        kinds.push(StepKind::PushPlugin { identity });
        if let Some(latest) = latest {
            kinds.push(StepKind::PushPlugin { identity: latest });
        }
    }

    kinds.into_iter().map(|kind| render(config, kind)).collect()
}

fn render(config: &BuildConfig, kind: StepKind) -> Step {
    let runtime = config.runtime.as_str();
    let (label, command, options): (String, Vec<String>, ExecOptions) = match &kind {
        StepKind::PrepareDirs => (
            "prepare build directories".to_string(),
            strings(&["mkdir", "-p", BUILD_DIR, ROOTFS_DIR]),
            ExecOptions::no_chdir(),
        ),
        StepKind::CopyPluginConfig => (
            "copy plugin config".to_string(),
            strings(&["cp", PLUGIN_CONFIG, BUILD_DIR]),
            ExecOptions::default(),
        ),
        StepKind::BuildRootfsImage => {
            let mut command = strings(&[
                runtime,
                "build",
                "--no-cache",
                "-f",
                DOCKERFILE,
                "--tag",
            ]);
            command.push(config.rootfs_image());
            for (name, value) in [
                ("gcsfuse_version", config.gcsfuse_version.as_str()),
                ("go_flags", config.go_flags()),
                ("upx_flags", config.upx_flags()),
                ("lint", config.lint_arg()),
            ] {
                command.push("--build-arg".to_string());
                command.push(format!("{name}={value}"));
            }
            command.push(BUILD_CONTEXT.to_string());
            (
                "build rootfs image".to_string(),
                command,
                ExecOptions::default(),
            )
        }
        StepKind::CreateRootfsContainer => (
            "create rootfs container".to_string(),
            vec![
                runtime.to_string(),
                "create".to_string(),
                "--name".to_string(),
                config.rootfs_container(),
                config.rootfs_image(),
            ],
            ExecOptions::default(),
        ),
        StepKind::ExportRootfs => (
            "export rootfs".to_string(),
            vec![
                runtime.to_string(),
                "export".to_string(),
                "--output".to_string(),
                EXPORT_ARCHIVE.to_string(),
                config.rootfs_container(),
            ],
            ExecOptions::default(),
        ),
        StepKind::ExtractRootfs => (
            "extract rootfs".to_string(),
            strings(&["tar", "-x", "-f", EXPORT_ARCHIVE, "-C", ROOTFS_DIR]),
            ExecOptions::default(),
        ),
        StepKind::CreatePlugin { identity } => (
            format!("create plugin {identity}"),
            strings(&[runtime, "plugin", "create", identity.as_str(), BUILD_DIR]),
            ExecOptions::default(),
        ),
        StepKind::InspectPlugin { identity } => (
            format!("inspect plugin {identity}"),
            strings(&[runtime, "plugin", "inspect", identity.as_str()]),
            ExecOptions::default(),
        ),
        StepKind::Login => (
            format!("log in as {}", config.plugin_repo),
            strings(&[runtime, "login", "-u", config.plugin_repo.as_str()]),
            ExecOptions::interactive(),
        ),
        StepKind::PushPlugin { identity } => (
            format!("push plugin {identity}"),
            strings(&[runtime, "plugin", "push", identity.as_str()]),
            ExecOptions::default(),
        ),
    };

    Step {
        kind,
        label,
        command,
        options,
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
