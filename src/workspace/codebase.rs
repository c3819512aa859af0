//! The live source tree that updates are applied to.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{fs_ops, StagedArtifact};
use crate::error::{ApplyError, InvalidPathError};

/// Root of the live codebase.
#[derive(Debug, Clone)]
pub struct LiveCodebase {
    root: PathBuf,
    /// Makes the rename step fail after the old artifact is removed.
    #[cfg(test)]
    fail_rename: bool,
}

impl LiveCodebase {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: fs_ops::absolutize(root.as_ref()),
            #[cfg(test)]
            fail_rename: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn failing_rename(mut self) -> Self {
        self.fail_rename = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, relative: &Path) -> Result<PathBuf, InvalidPathError> {
        Ok(self.root.join(fs_ops::validate_relative(relative)?))
    }

    pub fn exists(&self, relative: &Path) -> bool {
        self.path_for(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// Replaces the live artifact at the staged artifact's relative path.
    ///
    /// The staged content is first copied next to the target and checked
    /// against the staged digest; only then is the old artifact removed and
    /// the copy renamed into place. A failure before the removal leaves the
    /// live tree untouched. Backups are the caller's job.
    pub fn apply(&self, staged: &StagedArtifact) -> Result<PathBuf, ApplyError> {
        let relative = fs_ops::validate_relative(&staged.relative_path)?;
        if !staged.staged_path.exists() {
            return Err(ApplyError::StagedNotFound(staged.staged_path.clone()));
        }

        let target = self.root.join(&relative);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).map_err(|source| ApplyError::CopyFailed {
            path: target.clone(),
            source,
        })?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{file_name}.selfmod-{}", Uuid::new_v4().simple()));

        if let Err(source) = fs_ops::copy_artifact(&staged.staged_path, &temp) {
            discard(&temp);
            return Err(ApplyError::CopyFailed {
                path: target,
                source,
            });
        }

        let actual = match fs_ops::digest_artifact(&temp) {
            Ok(digest) => digest,
            Err(e) => {
                discard(&temp);
                return Err(e.into());
            }
        };
        if actual != staged.digest {
            discard(&temp);
            return Err(ApplyError::DigestMismatch {
                path: target,
                expected: staged.digest.clone(),
                actual,
            });
        }

        if let Err(source) = fs_ops::remove_artifact(&target) {
            discard(&temp);
            return Err(ApplyError::ReplaceFailed {
                path: target,
                source,
            });
        }
        if let Err(source) = self.rename(&temp, &target) {
            discard(&temp);
            return Err(ApplyError::ReplaceFailed {
                path: target,
                source,
            });
        }

        info!(
            "Applied {} to {}",
            staged.staged_path.display(),
            target.display()
        );
        Ok(target)
    }

    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_rename {
            return Err(std::io::Error::other("rename disabled"));
        }
        fs::rename(from, to)
    }
}

fn discard(temp: &Path) {
    match fs_ops::remove_artifact(temp) {
        Ok(_) => debug!("Discarded {}", temp.display()),
        Err(e) => warn!("Failed to remove {}: {}", temp.display(), e),
    }
}
