//! Fixed locations inside the builder container.
//!
//! Relative paths are resolved against the bind-mounted workspace
//! ([`crate::environment::WORK_DIR`]).

/// Plugin bundle directory handed to `docker plugin create`.
pub const BUILD_DIR: &str = "/tmp/build";
/// Root filesystem of the plugin bundle.
pub const ROOTFS_DIR: &str = "/tmp/build/rootfs";
/// Plugin manifest copied into the bundle.
pub const PLUGIN_CONFIG: &str = "config.json";
pub const DOCKERFILE: &str = "plugin/Dockerfile";
pub const BUILD_CONTEXT: &str = "plugin";
/// Archive the rootfs container is exported to.
pub const EXPORT_ARCHIVE: &str = "fs.tar";
