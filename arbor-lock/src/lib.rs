//! Atomic file writes and advisory per-path locking.

pub mod atomic_file;
pub mod lock;

pub use atomic_file::AtomicFile;
pub use lock::{ReadLock, TemporaryWriteLock, WriteLock};
