//! The `Transport` capability: a hierarchical byte-addressed store that the
//! rest of the engine reads and writes through, so that repository,
//! branch and store code never has to know whether it's talking to a
//! local filesystem, an HTTP server or a smart-server connection.

mod local;

pub use local::LocalTransport;

use arbor_errors::Result;
use arbor_lock::{ReadLock, WriteLock};

/// A single contiguous byte range request, for [`Transport::get_range`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

/// Hierarchical byte-addressed storage. Every method may block on I/O;
/// callers that need non-blocking pipelines layer their own scheduling on
/// top, the engine makes no progress guarantees during a call.
pub trait Transport: Send + Sync {
    /// Reads the full contents of `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Reads specific byte ranges of `path` in one request, as HTTP range
    /// transports do; a plain filesystem transport simply slices locally.
    fn get_range(&self, path: &str, ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>>;

    /// Overwrites `path` with `contents`, atomically from a reader's
    /// point of view.
    fn put(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Appends `contents` to `path`, creating it if absent. Returns the
    /// byte offset at which the new data begins.
    fn append(&self, path: &str, contents: &[u8]) -> Result<u64>;

    fn mkdir(&self, path: &str) -> Result<()>;

    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn delete(&self, path: &str) -> Result<()>;

    /// Names of entries directly inside `path`, in no particular order.
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    fn stat(&self, path: &str) -> Result<Stat>;

    fn has(&self, path: &str) -> bool;

    /// A transport rooted at `path` relative to this one's root.
    fn clone_transport(&self, relpath: &str) -> Box<dyn Transport>;

    /// The absolute form of `relpath` under this transport's root.
    fn abspath(&self, relpath: &str) -> String;

    fn lock_read(&self, path: &str) -> Result<ReadLock>;

    fn lock_write(&self, path: &str) -> Result<WriteLock>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stat {
    pub size: u64,
    pub is_dir: bool,
}
