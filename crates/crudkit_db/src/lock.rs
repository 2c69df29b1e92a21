//! Process-level locking.
//!
//! Two things must never run concurrently across processes: two writers on
//! one DuckDB file, and two schema synchronizations against one table. Both
//! are serialized with an exclusive lock on a `.lock` file beside the thing being guarded.
//!
//! Locks are advisory `fs2` locks and vanish with the process that held them.

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock is held by another process: {0}")]
    Locked(PathBuf),

    #[error("Failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    #[error("Failed to acquire lock: {0}")]
    AcquireFailed(#[source] io::Error),
}

/// Exclusive hold on a lock file, released on drop.
///
/// While held, a `<lock>.json` holder record next to the lock names the
/// owning process so a blocked caller can tell who to wait for.
pub struct DbLockGuard {
    _file: File,
    lock_path: PathBuf,
    holder_path: Option<PathBuf>,
}

impl DbLockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn hold(file: File, lock_path: &Path) -> Self {
        info!(lock = %lock_path.display(), "acquired exclusive lock");
        Self {
            _file: file,
            lock_path: lock_path.to_path_buf(),
            holder_path: Holder::current().write_beside(lock_path),
        }
    }
}

impl Drop for DbLockGuard {
    fn drop(&mut self) {
        debug!(lock = %self.lock_path.display(), "releasing lock");
        if let Some(path) = self.holder_path.take() {
            if let Err(e) = fs::remove_file(&path) {
                debug!(holder = %path.display(), "holder record not removed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for DbLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbLockGuard")
            .field("lock_path", &self.lock_path)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Holder {
    pid: u32,
    exe: Option<String>,
    acquired_at: String,
}

impl Holder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            exe: std::env::current_exe()
                .ok()
                .map(|p| p.display().to_string()),
            acquired_at: Utc::now().to_rfc3339(),
        }
    }

    /// Best effort; a missing holder record never fails the lock.
    fn write_beside(&self, lock_path: &Path) -> Option<PathBuf> {
        let path = holder_path_for(lock_path);
        let written = serde_json::to_vec_pretty(self)
            .map_err(io::Error::other)
            .and_then(|payload| fs::write(&path, payload));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(holder = %path.display(), "could not write lock holder record: {}", e);
                None
            }
        }
    }
}

fn holder_path_for(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Lock file guarding a database file: the database path with `.lock` added
/// to its extension.
///
/// `/data/app.duckdb` locks through `/data/app.duckdb.lock`, `/data/app`
/// through `/data/app.lock`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let ext = match db_path.extension() {
        Some(ext) => format!("{}.lock", ext.to_string_lossy()),
        None => "lock".to_string(),
    };
    db_path.with_extension(ext)
}

/// Take the lock without waiting; `LockError::Locked` if someone holds it.
pub fn try_lock_exclusive(lock_path: &Path) -> Result<DbLockGuard, LockError> {
    acquire(lock_path, false)
}

/// Take the lock, blocking until the current holder releases it.
pub fn lock_exclusive(lock_path: &Path) -> Result<DbLockGuard, LockError> {
    acquire(lock_path, true)
}

fn acquire(lock_path: &Path, wait: bool) -> Result<DbLockGuard, LockError> {
    debug!(lock = %lock_path.display(), wait, "acquiring exclusive lock");
    let file = open_lock_file(lock_path)?;

    // fs2's methods, spelled out: newer std has inherent `File` locks with other error types.
    let locked = if wait {
        FileExt::lock_exclusive(&file)
    } else {
        FileExt::try_lock_exclusive(&file)
    };

    match locked {
        Ok(()) => Ok(DbLockGuard::hold(file, lock_path)),
        Err(e) if !wait && e.kind() == io::ErrorKind::WouldBlock => {
            debug!(lock = %lock_path.display(), "lock is held elsewhere");
            Err(LockError::Locked(lock_path.to_path_buf()))
        }
        Err(e) => Err(LockError::AcquireFailed(e)),
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, LockError> {
    match lock_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(LockError::CreateFailed)?
        }
        _ => {}
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(LockError::CreateFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        let db_path = Path::new("/data/test.duckdb");
        assert_eq!(lock_path_for(db_path), PathBuf::from("/data/test.duckdb.lock"));

        // Without extension (no double-dot)
        let db_path_no_ext = Path::new("/data/mydb");
        assert_eq!(lock_path_for(db_path_no_ext), PathBuf::from("/data/mydb.lock"));

        let db_path_dots = Path::new("/data/my.data.db");
        assert_eq!(lock_path_for(db_path_dots), PathBuf::from("/data/my.data.db.lock"));
    }

    #[test]
    fn test_try_lock_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("users.lock");

        let guard = try_lock_exclusive(&lock_path).unwrap();
        assert!(guard.lock_path().exists());
        assert!(holder_path_for(&lock_path).exists());

        drop(guard);
        assert!(!holder_path_for(&lock_path).exists());

        let _guard2 = try_lock_exclusive(&lock_path).unwrap();
    }

    #[test]
    fn test_lock_contention() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("users.lock");

        let _guard = try_lock_exclusive(&lock_path).unwrap();

        let result = try_lock_exclusive(&lock_path);
        assert!(matches!(result, Err(LockError::Locked(_))));
    }

    #[test]
    fn test_lock_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("nested").join("dir").join("users.lock");

        let guard = lock_exclusive(&lock_path).unwrap();
        assert!(guard.lock_path().exists());
    }
}
