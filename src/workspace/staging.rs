//! Scratch tree holding candidate artifacts before they go live.
//!
//! Staged paths mirror the live codebase, so a staged test can import the
//! staged module by its final package path once the staging root is on the
//! import search path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::fs_ops;
use crate::error::StagingError;

/// An artifact copied into the staging area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    /// Path relative to both the staging root and the live root.
    pub relative_path: PathBuf,
    /// Absolute location inside the staging root.
    pub staged_path: PathBuf,
    /// SHA-256 of the staged content.
    pub digest: String,
}

/// The staging directory tree.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Opens the staging area at `root`, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StagingError> {
        let area = Self {
            root: fs_ops::absolutize(root.as_ref()),
        };
        area.ensure_root()?;
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute staging location for a relative path.
    pub fn path_for(&self, relative: &Path) -> Result<PathBuf, StagingError> {
        Ok(self.root.join(fs_ops::validate_relative(relative)?))
    }

    /// Whether something is staged at `relative`.
    pub fn contains(&self, relative: &Path) -> bool {
        self.path_for(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// Copies `source` into the staging area at `relative_target`.
    ///
    /// A staged directory is replaced wholesale rather than merged. A staged
    /// file is overwritten in place and keeps the source's modification time.
    pub fn stage(&self, source: &Path, relative_target: &Path) -> Result<StagedArtifact, StagingError> {
        let relative_path = fs_ops::validate_relative(relative_target)?;
        if !source.exists() {
            return Err(StagingError::SourceNotFound(source.to_path_buf()));
        }
        self.ensure_root()?;

        let staged_path = self.root.join(&relative_path);
        let copy_failed = |source| StagingError::CopyFailed {
            path: staged_path.clone(),
            source,
        };

        if let Some(parent) = staged_path.parent() {
            fs::create_dir_all(parent).map_err(copy_failed)?;
        }

        // A file cannot be copied over a directory, and a directory is never merged.
        if (source.is_dir() || staged_path.is_dir())
            && fs_ops::remove_artifact(&staged_path).map_err(copy_failed)?
        {
            debug!("Removed previously staged {}", staged_path.display());
        }
        fs_ops::copy_artifact(source, &staged_path).map_err(copy_failed)?;

        let digest = fs_ops::digest_artifact(&staged_path).map_err(copy_failed)?;
        info!(
            "Staged {} at {}",
            relative_path.display(),
            staged_path.display()
        );

        Ok(StagedArtifact {
            relative_path,
            staged_path,
            digest,
        })
    }

    /// Writes `contents` to a temporary file and stages it at `relative_target`.
    pub fn stage_contents(&self, contents: &str, relative_target: &Path) -> Result<StagedArtifact, StagingError> {
        let suffix = relative_target
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("selfmod_gen_")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;

        self.stage(file.path(), relative_target)
    }

    /// Looks up an already staged artifact.
    pub fn artifact(&self, relative: &Path) -> Result<StagedArtifact, StagingError> {
        let relative_path = fs_ops::validate_relative(relative)?;
        let staged_path = self.root.join(&relative_path);
        if !staged_path.exists() {
            return Err(StagingError::NotStaged(relative_path));
        }
        let digest = fs_ops::digest_artifact(&staged_path)?;
        Ok(StagedArtifact {
            relative_path,
            staged_path,
            digest,
        })
    }

    /// Clears one staged item, or the whole staging area when `relative` is `None`.
    ///
    /// Clearing an item that is not staged only logs a warning.
    pub fn clear(&self, relative: Option<&Path>) -> Result<(), StagingError> {
        match relative {
            Some(relative) => {
                let path = self.path_for(relative)?;
                if fs_ops::remove_artifact(&path)? {
                    info!("Cleared staged item {}", path.display());
                } else {
                    warn!("Nothing staged at {}", path.display());
                }
            }
            None => {
                fs_ops::remove_artifact(&self.root)?;
                self.ensure_root()?;
                info!("Cleared staging area {}", self.root.display());
            }
        }
        Ok(())
    }

    fn ensure_root(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
