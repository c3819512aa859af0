//! Append-only archive of artifacts taken right before they are replaced.
//!
//! Backup names are the relative path with separators turned into `_`,
//! followed by a microsecond UTC timestamp: `utils_tool.py.20260101_120000_000001`.
//! A literal `_` or `%` inside a component is percent-escaped first, so
//! `a/b.py` and `a_b.py` never share a name (`a_b.py` vs `a%5Fb.py`).
//! A collision within the same microsecond gets a `-N` suffix, so no backup
//! ever overwrites another.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::fs_ops;
use crate::error::BackupError;

/// Timestamp suffix of backup names.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// One snapshot in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_relative_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Backups of artifacts under a live root.
#[derive(Debug, Clone)]
pub struct BackupArchive {
    live_root: PathBuf,
    backup_root: PathBuf,
}

impl BackupArchive {
    pub fn new(live_root: impl AsRef<Path>, backup_root: impl AsRef<Path>) -> Result<Self, BackupError> {
        let archive = Self {
            live_root: fs_ops::absolutize(live_root.as_ref()),
            backup_root: fs_ops::absolutize(backup_root.as_ref()),
        };
        archive.ensure_root()?;
        Ok(archive)
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    pub fn live_root(&self) -> &Path {
        &self.live_root
    }

    /// Snapshots the live artifact at `relative`.
    ///
    /// Returns `Ok(None)` when there is nothing to back up.
    pub fn backup(&self, relative: &Path) -> Result<Option<BackupRecord>, BackupError> {
        let relative = fs_ops::validate_relative(relative)?;
        self.ensure_root()?;

        let source = self.live_root.join(&relative);
        if !source.exists() {
            warn!(
                "No live artifact at {}, nothing to back up",
                source.display()
            );
            return Ok(None);
        }

        let timestamp = Utc::now().trunc_subsecs(6);
        let base = format!(
            "{}.{}",
            encode_name(&relative),
            timestamp.format(BACKUP_TIMESTAMP_FORMAT)
        );
        let backup_path = self
            .reserve(&base, source.is_dir())
            .map_err(|source| BackupError::CopyFailed {
                path: self.backup_root.join(&base),
                source,
            })?;

        fs_ops::copy_artifact(&source, &backup_path).map_err(|source| BackupError::CopyFailed {
            path: backup_path.clone(),
            source,
        })?;

        info!(
            "Backed up {} to {}",
            relative.display(),
            backup_path.display()
        );
        Ok(Some(BackupRecord {
            original_relative_path: relative,
            backup_path,
            timestamp,
        }))
    }

    /// All backups of `relative`, oldest first.
    pub fn history(&self, relative: &Path) -> Result<Vec<BackupRecord>, BackupError> {
        let relative = fs_ops::validate_relative(relative)?;
        self.ensure_root()?;

        let prefix = format!("{}.", encode_name(&relative));
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.backup_root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(timestamp) = parse_stamp(stamp) else {
                continue;
            };
            records.push(BackupRecord {
                original_relative_path: relative.clone(),
                backup_path: entry.path(),
                timestamp,
            });
        }

        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| collision_index(&a.backup_path).cmp(&collision_index(&b.backup_path)))
        });
        Ok(records)
    }

    /// Copies a backup back over the live artifact it was taken from.
    pub fn restore(&self, record: &BackupRecord) -> Result<PathBuf, BackupError> {
        if !record.backup_path.exists() {
            return Err(BackupError::MissingBackup(record.backup_path.clone()));
        }
        let relative = fs_ops::validate_relative(&record.original_relative_path)?;
        let target = self.live_root.join(&relative);
        let restore_failed = |source| BackupError::RestoreFailed {
            path: target.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(restore_failed)?;
        }
        fs_ops::remove_artifact(&target).map_err(restore_failed)?;
        fs_ops::copy_artifact(&record.backup_path, &target).map_err(restore_failed)?;

        info!(
            "Restored {} from {}",
            target.display(),
            record.backup_path.display()
        );
        Ok(target)
    }

    fn ensure_root(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.backup_root)?;
        Ok(())
    }

    /// Claims an unused name under the backup root.
    ///
    /// The placeholder is created atomically, so concurrent backups of the
    /// same path in the same microsecond still land in distinct entries.
    fn reserve(&self, base: &str, is_dir: bool) -> io::Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                base.to_string()
            } else {
                format!("{base}-{attempt}")
            };
            let candidate = self.backup_root.join(name);
            let created = if is_dir {
                fs::create_dir(&candidate)
            } else {
                fs::File::options()
                    .write(true)
                    .create_new(true)
                    .open(&candidate)
                    .map(drop)
            };
            match created {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_string_lossy()
                .replace('%', "%25")
                .replace('_', "%5F")
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    let stamp = match stamp.rsplit_once('-') {
        Some((head, index)) if index.chars().all(|c| c.is_ascii_digit()) => head,
        _ => stamp,
    };
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn collision_index(path: &Path) -> u32 {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rsplit_once('-'))
        .and_then(|(_, index)| index.parse().ok())
        .unwrap_or(0)
}
