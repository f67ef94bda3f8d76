use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_TAG: &str = "1.0.0";
pub const DEFAULT_GCSFUSE_VERSION: &str = "0.27.0";
pub const DEFAULT_BUILDER_IMAGE: &str = "docker:stable-dind";
pub const DEFAULT_PLUGIN_REPO: &str = "ofekmeister";
pub const DEFAULT_PLUGIN_NAME: &str = "gcsfs";
pub const DEFAULT_RUNTIME: &str = "docker";

const RELEASE_GO_FLAGS: &str = "-ldflags=-s -ldflags=-w";
const RELEASE_UPX_FLAGS: &str = "--best --ultra-brute";
const DEV_UPX_FLAGS: &str = "-1";
const RC_SUFFIX: &str = "-rc";
const LATEST_TAG: &str = "latest";

/// Parameters of one pipeline run. Resolved once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub plugin_repo: String,
    pub plugin_name: String,
    pub tag: String,
    pub release: bool,
    pub gcsfuse_version: String,
    pub builder_image: String,
    pub runtime: String,
    pub lint: bool,
    pub push: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            plugin_repo: DEFAULT_PLUGIN_REPO.to_string(),
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            tag: DEFAULT_TAG.to_string(),
            release: false,
            gcsfuse_version: DEFAULT_GCSFUSE_VERSION.to_string(),
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            lint: false,
            push: true,
        }
    }
}

impl BuildConfig {
    /// `<repo>/<name>`, the plugin reference without a tag.
    pub fn plugin(&self) -> String {
        format!("{}/{}", self.plugin_repo, self.plugin_name)
    }

    /// Versioned identity. Non-release builds are marked as release candidates.
    pub fn identity(&self) -> String {
        if self.release {
            format!("{}:{}", self.plugin(), self.tag)
        } else {
            format!("{}:{}{}", self.plugin(), self.tag, RC_SUFFIX)
        }
    }

    /// Floating `latest` identity, produced by release builds only.
    pub fn latest_identity(&self) -> Option<String> {
        self.release
            .then(|| format!("{}:{}", self.plugin(), LATEST_TAG))
    }

    /// Linker flags for the driver build: stripped in release mode.
    pub fn go_flags(&self) -> &'static str {
        if self.release {
            RELEASE_GO_FLAGS
        } else {
            ""
        }
    }

    /// Binary compression aggressiveness.
    pub fn upx_flags(&self) -> &'static str {
        if self.release {
            RELEASE_UPX_FLAGS
        } else {
            DEV_UPX_FLAGS
        }
    }

    pub fn lint_arg(&self) -> &'static str {
        if self.lint {
            "true"
        } else {
            "false"
        }
    }

    /// Name of the Docker-in-Docker builder container.
    pub fn builder_container(&self) -> String {
        format!("{}-builder", self.plugin_name)
    }

    /// Intermediate image holding the plugin's root filesystem.
    pub fn rootfs_image(&self) -> String {
        format!("{}:rootfs", self.plugin_name)
    }

    /// Stopped container the root filesystem is exported from.
    pub fn rootfs_container(&self) -> String {
        format!("{}-rootfs", self.plugin_name)
    }
}

/// Values supplied on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub tag: Option<String>,
    pub gcsfuse_version: Option<String>,
    pub builder_image: Option<String>,
    pub runtime: Option<String>,
    pub release: bool,
    pub lint: bool,
    pub no_push: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuilderToml {
    build: Option<BuildToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildToml {
    plugin_repo: Option<String>,
    plugin_name: Option<String>,
    tag: Option<String>,
    gcsfuse_version: Option<String>,
    builder_image: Option<String>,
    runtime: Option<String>,
    release: Option<bool>,
    lint: Option<bool>,
    push: Option<bool>,
}

/// Resolve the run configuration: defaults, then `config_file`, then `overrides`.
pub fn resolve(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<BuildConfig> {
    let file = match config_file {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading builder config '{}'", path.display()))?;
            parse_config(&raw).with_context(|| format!("parsing builder config '{}'", path.display()))?
        }
        None => BuildToml::default(),
    };
    resolve_layers(file, overrides)
}

fn parse_config(raw: &str) -> Result<BuildToml> {
    let parsed: BuilderToml = toml::from_str(raw)?;
    Ok(parsed.build.unwrap_or_default())
}

fn resolve_layers(file: BuildToml, overrides: &ConfigOverrides) -> Result<BuildConfig> {
    let defaults = BuildConfig::default();

    let config = BuildConfig {
        plugin_repo: pick(&None, file.plugin_repo, defaults.plugin_repo),
        plugin_name: pick(&None, file.plugin_name, defaults.plugin_name),
        tag: pick(&overrides.tag, file.tag, defaults.tag),
        release: overrides.release || file.release.unwrap_or(defaults.release),
        gcsfuse_version: pick(
            &overrides.gcsfuse_version,
            file.gcsfuse_version,
            defaults.gcsfuse_version,
        ),
        builder_image: pick(&overrides.builder_image, file.builder_image, defaults.builder_image),
        runtime: pick(&overrides.runtime, file.runtime, defaults.runtime),
        lint: overrides.lint || file.lint.unwrap_or(defaults.lint),
        push: !overrides.no_push && file.push.unwrap_or(defaults.push),
    };

    validate(&config)?;
    Ok(config)
}

fn pick(cli: &Option<String>, file: Option<String>, default: String) -> String {
    cli.clone()
        .or(file)
        .map(|value| value.trim().to_string())
        .unwrap_or(default)
}

fn validate(config: &BuildConfig) -> Result<()> {
    let required = [
        ("plugin_repo", &config.plugin_repo),
        ("plugin_name", &config.plugin_name),
        ("tag", &config.tag),
        ("gcsfuse_version", &config.gcsfuse_version),
        ("builder_image", &config.builder_image),
        ("runtime", &config.runtime),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            bail!("invalid builder config: {field} must not be empty");
        }
    }

    for (field, value) in [
        ("plugin_repo", &config.plugin_repo),
        ("plugin_name", &config.plugin_name),
        ("tag", &config.tag),
    ] {
        if value.contains(char::is_whitespace) || value.contains('/') || value.contains(':') {
            bail!(
                "invalid builder config: {field} '{}' may not contain whitespace, '/' or ':'",
                value
            );
        }
    }

    if config.release && config.tag == LATEST_TAG {
        bail!("invalid builder config: tag '{LATEST_TAG}' is reserved for the floating release identity");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_published_plugin() {
        let config = resolve(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.identity(), "ofekmeister/gcsfs:1.0.0-rc");
        assert_eq!(config.latest_identity(), None);
        assert!(config.push);
    }

    #[test]
    fn release_mode_flags_and_identities() {
        let config = BuildConfig {
            release: true,
            ..BuildConfig::default()
        };
        assert_eq!(config.identity(), "ofekmeister/gcsfs:1.0.0");
        assert_eq!(
            config.latest_identity().as_deref(),
            Some("ofekmeister/gcsfs:latest")
        );
        assert_eq!(config.go_flags(), "-ldflags=-s -ldflags=-w");
        assert_eq!(config.upx_flags(), "--best --ultra-brute");
    }

    #[test]
    fn dev_mode_flags() {
        let config = BuildConfig::default();
        assert_eq!(config.go_flags(), "");
        assert_eq!(config.upx_flags(), "-1");
        assert_eq!(config.lint_arg(), "false");
    }

    #[test]
    fn derived_container_names() {
        let config = BuildConfig::default();
        assert_eq!(config.builder_container(), "gcsfs-builder");
        assert_eq!(config.rootfs_image(), "gcsfs:rootfs");
        assert_eq!(config.rootfs_container(), "gcsfs-rootfs");
    }

    #[test]
    fn file_layer_then_cli_layer() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[build]\ntag = \"2.0.0\"\ngcsfuse_version = \"abc123\"\nlint = true\npush = false\nplugin_repo = \"acme\""
        )
        .unwrap();

        let overrides = ConfigOverrides {
            tag: Some("2.1.0".to_string()),
            release: true,
            ..ConfigOverrides::default()
        };
        let config = resolve(Some(file.path()), &overrides).unwrap();

        assert_eq!(config.tag, "2.1.0");
        assert_eq!(config.gcsfuse_version, "abc123");
        assert_eq!(config.plugin_repo, "acme");
        assert!(config.release);
        assert!(config.lint);
        assert!(!config.push);
        assert_eq!(config.identity(), "acme/gcsfs:2.1.0");
    }

    #[test]
    fn no_push_override_wins() {
        let overrides = ConfigOverrides {
            no_push: true,
            ..ConfigOverrides::default()
        };
        let config = resolve(None, &overrides).unwrap();
        assert!(!config.push);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_config("[build]\nflavour = \"x\"\n").is_err());
        assert!(parse_config("[other]\n").is_err());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = parse_config("").unwrap();
        let config = resolve_layers(file, &ConfigOverrides::default()).unwrap();
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let blank = ConfigOverrides {
            tag: Some("  ".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(resolve(None, &blank).is_err());

        let slash = ConfigOverrides {
            tag: Some("1.0/evil".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(resolve(None, &slash).is_err());

    }

    #[test]
    fn latest_tag_only_collides_in_release_mode() {
        let dev = ConfigOverrides {
            tag: Some("latest".to_string()),
            ..ConfigOverrides::default()
        };
        let config = resolve(None, &dev).unwrap();
        assert_eq!(config.identity(), "ofekmeister/gcsfs:latest-rc");

        let release = ConfigOverrides {
            release: true,
            ..dev
        };
        let err = resolve(None, &release).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn file_values_are_trimmed() {
        let file = parse_config("[build]\nplugin_repo = \" acme \"\nplugin_name = \"gcsfs \"\ntag = \" 2.0 \"\n")
            .unwrap();
        let config = resolve_layers(file, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.plugin_repo, "acme");
        assert_eq!(config.plugin_name, "gcsfs");
        assert_eq!(config.identity(), "acme/gcsfs:2.0-rc");
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let err = resolve(
            Some(Path::new("/definitely/not/here.toml")),
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.toml"));
    }
}
