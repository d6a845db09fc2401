//! Per-path advisory locking with read/write modes, process-local
//! reentrancy counting, and a temporary write upgrade — the Rust shape of
//! `_fcntl_ReadLock`/`_fcntl_WriteLock`'s open-lock-count bookkeeping
//! layered over an OS advisory lock via [`fs2`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arbor_errors::{Error, Result};
use fs2::FileExt;
use once_cell::sync::Lazy;

#[derive(Default)]
struct Registry {
    write_holders: HashMap<PathBuf, (String, usize)>,
    read_counts: HashMap<PathBuf, usize>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

fn canonical(path: &Path) -> Result<PathBuf> {
    // A lock file may not exist yet; fall back to the literal path rather
    // than failing, mirroring `_open`'s "create missing lock" behavior.
    Ok(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|_| Error::LockFailed(path.to_path_buf()))
}

/// A held write lock on `path`. Exclusive: fails immediately with
/// [`Error::LockContention`] if a different holder — another read lock,
/// or a write lock under a different `holder` string — already has the
/// path. Reentrant for the same `holder`: nested acquisitions increment
/// a count and hand back a guard with no OS-level lock of its own,
/// mirroring [`ReadLock`]'s counting. Nested guards are expected to
/// unwind in the order they were acquired (the outermost guard is the
/// one actually holding the OS lock, so dropping it out of order would
/// release the lock while an inner guard still thinks it's held).
pub struct WriteLock {
    path: PathBuf,
    file: Option<File>,
}

impl WriteLock {
    pub fn acquire(path: impl AsRef<Path>, holder: impl Into<String>) -> Result<Self> {
        let path = canonical(path.as_ref())?;
        let holder = holder.into();
        {
            let mut reg = REGISTRY.lock().unwrap();
            if let Some((existing_holder, count)) = reg.write_holders.get_mut(&path) {
                if *existing_holder != holder {
                    return Err(Error::LockContention { path, holder });
                }
                *count += 1;
                tracing::trace!(?path, count = *count, "write lock re-entered");
                return Ok(WriteLock { path, file: None });
            }
            if reg.read_counts.contains_key(&path) {
                return Err(Error::LockContention { path, holder });
            }
            reg.write_holders.insert(path.clone(), (holder.clone(), 1));
        }
        let file = open_lock_file(&path)?;
        if file.try_lock_exclusive().is_err() {
            REGISTRY.lock().unwrap().write_holders.remove(&path);
            return Err(Error::LockContention {
                path,
                holder: "another process".to_string(),
            });
        }
        tracing::trace!(?path, "write lock acquired");
        Ok(WriteLock {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unlock(mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        let mut reg = REGISTRY.lock().unwrap();
        let outermost = match reg.write_holders.get_mut(&self.path) {
            Some((_, count)) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                reg.write_holders.remove(&self.path);
                true
            }
            None => return,
        };
        drop(reg);
        if outermost {
            if let Some(file) = self.file.take() {
                let _ = fs2::FileExt::unlock(&file);
            }
            tracing::trace!(path = ?self.path, "write lock released");
        } else {
            tracing::trace!(path = ?self.path, "write lock re-entry released");
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// A held read lock on `path`. Shared with other readers; excludes a
/// write-lock acquisition by any other holder. Reentrant within a process:
/// acquiring the same path again increments a count released only when the
/// outermost guard drops.
pub struct ReadLock {
    path: PathBuf,
    file: Option<File>,
}

impl ReadLock {
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = canonical(path.as_ref())?;
        {
            let reg = REGISTRY.lock().unwrap();
            if let Some((holder, _)) = reg.write_holders.get(&path) {
                return Err(Error::LockContention {
                    path,
                    holder: holder.clone(),
                });
            }
        }
        let file = open_lock_file(&path)?;
        if file.try_lock_shared().is_err() {
            return Err(Error::LockContention {
                path,
                holder: "another process".to_string(),
            });
        }
        *REGISTRY
            .lock()
            .unwrap()
            .read_counts
            .entry(path.clone())
            .or_insert(0) += 1;
        tracing::trace!(?path, "read lock acquired");
        Ok(ReadLock {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts to upgrade to a write lock without releasing this read
    /// lock's place in the registry first. Succeeds only when no other
    /// reader (in this process) shares the path — matching
    /// `temporary_write_lock`'s single-reader requirement. On success
    /// returns a [`TemporaryWriteLock`] that can be turned back into a
    /// [`ReadLock`] via [`TemporaryWriteLock::restore_read_lock`].
    pub fn temporary_write_lock(self) -> std::result::Result<TemporaryWriteLock, ReadLock> {
        let count = *REGISTRY
            .lock()
            .unwrap()
            .read_counts
            .get(&self.path)
            .unwrap_or(&0);
        if count > 1 {
            return Err(self);
        }
        let file = match open_lock_file(&self.path) {
            Ok(f) => f,
            Err(_) => return Err(self),
        };
        if file.try_lock_exclusive().is_err() {
            return Err(self);
        }
        REGISTRY
            .lock()
            .unwrap()
            .write_holders
            .insert(self.path.clone(), ("temporary-write-upgrade".to_string(), 1));
        Ok(TemporaryWriteLock {
            path: self.path.clone(),
            file: Some(file),
            original: self,
        })
    }

    fn release(&mut self) {
        if self.file.take().is_some() {
            let mut reg = REGISTRY.lock().unwrap();
            if let Some(count) = reg.read_counts.get_mut(&self.path) {
                if *count <= 1 {
                    reg.read_counts.remove(&self.path);
                } else {
                    *count -= 1;
                }
            }
            tracing::trace!(path = ?self.path, "read lock released");
        }
    }
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// The token returned by [`ReadLock::temporary_write_lock`]. The original
/// read lock's OS-level hold is kept open underneath (matching the fcntl
/// implementation, which never releases the shared lock during an
/// upgrade); only the write lock itself is released by
/// [`restore_read_lock`](Self::restore_read_lock).
pub struct TemporaryWriteLock {
    path: PathBuf,
    file: Option<File>,
    original: ReadLock,
}

impl TemporaryWriteLock {
    pub fn restore_read_lock(mut self) -> ReadLock {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
            REGISTRY.lock().unwrap().write_holders.remove(&self.path);
        }
        self.original
    }
}

impl Drop for TemporaryWriteLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
            REGISTRY.lock().unwrap().write_holders.remove(&self.path);
        }
    }
}
