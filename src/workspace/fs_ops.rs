//! Filesystem primitives shared by staging, backup and apply.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::InvalidPathError;

/// Normalises a relative artifact path, rejecting anything that could
/// escape the root it is joined onto.
pub fn validate_relative(path: &Path) -> Result<PathBuf, InvalidPathError> {
    let invalid = |reason: &str| InvalidPathError {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let mut normalised = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalised.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => return Err(invalid("must be relative")),
        }
    }

    if normalised.as_os_str().is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(normalised)
}

/// Absolute form of `path` without requiring it to exist.
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Copies a file or a whole directory tree to `dst`.
///
/// File modification times are carried over. `dst` must not be a directory
/// when `src` is a file.
pub fn copy_artifact(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        copy_dir(src, dst)
    } else {
        copy_file(src, dst)
    }
}

/// Copies one file, overwriting `dst` and preserving the modification time.
///
/// Permissions travel with the content, so a read-only `src` yields a
/// read-only `dst`; an existing read-only `dst` is replaced rather than
/// written through.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Ok(existing) = fs::symlink_metadata(dst) {
        if existing.is_file() && existing.permissions().readonly() {
            fs::remove_file(dst)?;
        }
    }
    fs::copy(src, dst)?;
    let modified = fs::metadata(src)?.modified()?;
    fs::File::open(dst)?.set_modified(modified)
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Removes a file or directory tree. Returns `false` when nothing was there.
pub fn remove_artifact(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

/// SHA-256 of an artifact as lowercase hex.
///
/// Files hash their bytes. Directories hash every file's relative path and
/// bytes in sorted order, so two trees with identical content agree.
pub fn digest_artifact(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();

    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(fs::read(entry.path())?);
            hasher.update([0u8]);
        }
    } else {
        hasher.update(fs::read(path)?);
    }

    Ok(hex::encode(hasher.finalize()))
}
