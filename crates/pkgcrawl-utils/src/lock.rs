//! Advisory file locks built on `flock`.
//!
//! Locks are keyed by name; the name is sanitized into a `.lock` file inside
//! a lock directory. The lock is held for as long as the [`FileLock`] lives.

use std::{
    fs::{self, File, OpenOptions},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

use crate::error::{LockError, LockResult};

/// An exclusive `flock` on a lock file, released on drop.
pub struct FileLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl FileLock {
    /// Default lock directory for process-wide locks.
    ///
    /// Uses `$XDG_RUNTIME_DIR/pkgcrawl/locks`, falling back to the system temp dir.
    pub fn default_dir() -> PathBuf {
        let base = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        base.join("pkgcrawl").join("locks")
    }

    fn lock_path(dir: &Path, name: &str) -> LockResult<PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| {
                LockError::Io {
                    path: dir.to_path_buf(),
                    source,
                }
            })?;
        }

        let sanitized = name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        Ok(dir.join(format!("{sanitized}.lock")))
    }

    fn open(path: &Path) -> LockResult<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| {
                LockError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    /// Acquire an exclusive lock named `name` in the default lock directory.
    pub fn acquire(name: &str) -> LockResult<Self> {
        Self::acquire_in(&Self::default_dir(), name)
    }

    /// True while `path` still names the locked file.
    ///
    /// A lock taken on a file that [`remove`](Self::remove) unlinked in the
    /// meantime guards nothing, so callers retry on a fresh file.
    fn is_linked(file: &File, path: &Path) -> bool {
        match (file.metadata(), fs::metadata(path)) {
            (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
            _ => false,
        }
    }

    /// Acquire an exclusive lock named `name` inside `dir`, blocking until it is free.
    pub fn acquire_in(dir: &Path, name: &str) -> LockResult<Self> {
        let path = Self::lock_path(dir, name)?;
        loop {
            let file = Self::open(&path)?;
            let file = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, err)| {
                LockError::AcquireFailed(format!("{}: {}", path.display(), err))
            })?;

            if Self::is_linked(&file, &path) {
                return Ok(FileLock {
                    _file: file,
                    path,
                });
            }
        }
    }

    /// Try to acquire a lock in the default directory without blocking.
    pub fn try_acquire(name: &str) -> LockResult<Option<Self>> {
        Self::try_acquire_in(&Self::default_dir(), name)
    }

    /// Try to acquire a lock without blocking.
    ///
    /// Returns `None` if the lock is currently held elsewhere.
    pub fn try_acquire_in(dir: &Path, name: &str) -> LockResult<Option<Self>> {
        let path = Self::lock_path(dir, name)?;
        loop {
            let file = Self::open(&path)?;
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(file) if Self::is_linked(&file, &path) => {
                    return Ok(Some(FileLock {
                        _file: file,
                        path,
                    }))
                }
                Ok(_) => continue,
                Err((_, Errno::EWOULDBLOCK)) => return Ok(None),
                Err((_, err)) => {
                    return Err(LockError::AcquireFailed(format!(
                        "{}: {}",
                        path.display(),
                        err
                    )))
                }
            }
        }
    }

    /// Unlinks the lock file, then releases the lock.
    pub fn remove(self) -> LockResult<()> {
        fs::remove_file(&self.path).map_err(|source| {
            LockError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
