//! Two-level exclusion for a store path.
//!
//! An in-process mutex serializes threads sharing one provider; an advisory
//! `flock(2)` on a sidecar file serializes processes. The mutex is taken
//! first and released last, so a thread never piggybacks on a file lock
//! another thread is about to drop.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{trace, warn};

use crate::{atomic, error::StoreError};

/// Suffix appended to the store path to name the lock sidecar.
pub const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    local: Mutex<()>,
}

impl StoreLock {
    pub fn for_store(store_path: &Path) -> Self {
        let mut path = store_path.as_os_str().to_owned();
        path.push(LOCK_SUFFIX);
        Self {
            path: PathBuf::from(path),
            local: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` while holding both locks. Blocks until the file lock is free.
    pub fn with_exclusive<T>(
        &self,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _local = self.local.lock().map_err(|_| StoreError::Poisoned)?;
        let _file = FileLockGuard::acquire(&self.path)?;
        f()
    }
}

/// Held OS lock; released on drop.
struct FileLockGuard<'a> {
    file: File,
    path: &'a Path,
}

impl<'a> FileLockGuard<'a> {
    fn acquire(path: &'a Path) -> Result<Self, StoreError> {
        let lock_err = |source| StoreError::LockAcquisition {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            atomic::ensure_dir(parent)?;
        }
        let file = open_sidecar(path).map_err(lock_err)?;
        flock(&file, Op::Exclusive).map_err(lock_err)?;
        trace!(path = %path.display(), "file lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = flock(&self.file, Op::Unlock) {
            warn!(path = %self.path.display(), "unlock failed: {err}");
        }
    }
}

fn open_sidecar(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[derive(Clone, Copy)]
enum Op {
    Exclusive,
    Unlock,
}

#[cfg(unix)]
fn flock(file: &File, op: Op) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let op = match op {
        Op::Exclusive => libc::LOCK_EX,
        Op::Unlock => libc::LOCK_UN,
    };
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn flock(_file: &File, _op: Op) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "advisory file locking requires a unix platform",
    ))
}
