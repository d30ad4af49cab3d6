//! Crash-safe replacement of a file: write a sibling temp file, sync it, rename it over the target.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::StoreError;

/// A fully written and synced temp file that has not yet replaced its target.
/// Dropping it without [`StagedFile::commit`] removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
}

impl StagedFile {
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically rename the staged file onto `target`.
    pub fn commit(self, target: &Path) -> Result<(), StoreError> {
        self.tmp
            .persist(target)
            .map_err(|e| StoreError::io("rename temp file")(e.error))?;
        debug!(path = %target.display(), "store file replaced");
        Ok(())
    }

    /// Move the staged file onto `target` only if nothing exists there.
    /// An occupied target is reported as [`io::ErrorKind::AlreadyExists`].
    pub fn commit_new(self, target: &Path) -> io::Result<()> {
        self.tmp.persist_noclobber(target).map_err(|e| e.error)?;
        debug!(path = %target.display(), "file created");
        Ok(())
    }
}

/// Create `dir` (and parents) with owner-only permissions if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(StoreError::io("create store dir"))
}

/// Write `bytes` to a new owner-only temp file next to `target` and sync it.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedFile, StoreError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;

    let mut tmp = Builder::new()
        .prefix(".secrets-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(StoreError::io("create temp file"))?;
    restrict(tmp.as_file()).map_err(StoreError::io("chmod temp file"))?;
    tmp.write_all(bytes)
        .map_err(StoreError::io("write temp file"))?;
    tmp.as_file()
        .sync_all()
        .map_err(StoreError::io("sync temp file"))?;
    Ok(StagedFile { tmp })
}

/// Stage then commit in one step.
pub fn write(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    stage(target, bytes)?.commit(target)
}

#[cfg(unix)]
fn restrict(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
