//! Workspace snapshot staged for the build environment.
//!
//! The builder container bind-mounts a private copy of the source tree, so
//! nothing the build writes (`fs.tar`, intermediate files) lands in the
//! checkout. Version control metadata and vendored dependencies are left out.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Entry names skipped at any depth.
pub const EXCLUDED_NAMES: &[&str] = &[".git", "vendor"];

/// Directory name of the copy inside the temporary directory.
const SNAPSHOT_DIR_NAME: &str = "plugin";

/// A filtered copy of the source tree in a temporary directory.
///
/// The copy is deleted when the snapshot is dropped.
#[derive(Debug)]
pub struct WorkspaceSnapshot {
    _temp: TempDir,
    root: PathBuf,
}

impl WorkspaceSnapshot {
    /// Copy `source` into a fresh temporary directory.
    pub fn stage(source: &Path) -> Result<Self> {
        if !source.is_dir() {
            bail!("source directory not found: {}", source.display());
        }

        let temp = TempDir::new().context("creating temporary directory for workspace snapshot")?;
        // Bind mounts need the resolved path (e.g. /var -> /private/var on macOS).
        let base = fs::canonicalize(temp.path()).with_context(|| {
            format!("resolving temporary directory '{}'", temp.path().display())
        })?;
        let root = base.join(SNAPSHOT_DIR_NAME);

        let copied = copy_tree(source, &root, EXCLUDED_NAMES)?;
        tracing::debug!(
            source = %source.display(),
            root = %root.display(),
            files = copied,
            "staged workspace snapshot"
        );

        Ok(Self { _temp: temp, root })
    }

    /// Root of the copied tree; this is what the environment mounts.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Recursively copy `src` into `dst`, skipping entries whose name is in
/// `excluded`. Symlinks are recreated, not followed. Returns the number of
/// files and symlinks copied.
pub fn copy_tree(src: &Path, dst: &Path, excluded: &[&str]) -> Result<u64> {
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| excluded.contains(&name))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("walking source tree '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("Failed to read symlink: {}", entry.path().display()))?;
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("Failed to create symlink: {}", target.display()))?;
            copied += 1;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy file: {}", entry.path().display()))?;
            copied += 1;
        }
    }

    Ok(copied)
}
