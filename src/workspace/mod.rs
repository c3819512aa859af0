//! Filesystem side of self-modification.
//!
//! - **Staging** (`staging`): scratch tree mirroring the live layout
//! - **Backup** (`backup`): timestamped, never-overwritten snapshots
//! - **Codebase** (`codebase`): the live tree and the apply operation
//! - **fs_ops**: path validation, copying, removal and content digests
//!
//! Every root is created on first use, and every relative path is validated
//! before it is joined onto a root.

pub mod backup;
pub mod codebase;
pub mod fs_ops;
pub mod staging;

pub use backup::{BackupArchive, BackupRecord, BACKUP_TIMESTAMP_FORMAT};
pub use codebase::LiveCodebase;
pub use fs_ops::{digest_artifact, validate_relative};
pub use staging::{StagedArtifact, StagingArea};
