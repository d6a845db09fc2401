//! Error taxonomy for the arbor engine.
//!
//! Each category in the taxonomy gets its own variant group on [`Error`]
//! rather than its own type, mirroring how `failure_ext` layers a handful of
//! well-known causes under one enum that every crate in the workspace
//! returns. Recoverable categories (a missing path, an absent revision) are
//! ordinary variants callers match on and convert to a negative result at
//! the call site; [`Error::Bug`] is reserved for invariant violations that
//! are never supposed to happen and are not the caller's fault.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // -- Path errors --------------------------------------------------
    #[error("no such file: {0}")]
    NoSuchFile(PathBuf),
    #[error("file already exists: {0}")]
    FileExists(PathBuf),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    // -- Lock errors ----------------------------------------------------
    #[error("lock contention on {path}: held by {holder}")]
    LockContention { path: PathBuf, holder: String },
    #[error("lock broken on {0}")]
    LockBroken(PathBuf),
    #[error("lock not held on {0}")]
    LockNotHeld(PathBuf),
    #[error("could not create lock file {0}")]
    LockFailed(PathBuf),
    #[error("object not locked: {0}")]
    ObjectNotLocked(String),
    #[error("read-only attempted on {0}")]
    ReadOnlyAttempted(PathBuf),
    #[error("transport does not support locking: {0}")]
    UnlockableTransport(String),

    // -- Revision errors --------------------------------------------------
    #[error("no such revision: {0}")]
    NoSuchRevision(String),
    #[error("invalid revision id: {0:?}")]
    InvalidRevisionId(Option<String>),
    #[error("invalid revision number: {0}")]
    InvalidRevisionNumber(i64),
    #[error("revision already present: {0}")]
    RevisionAlreadyPresent(String),
    #[error("ghost revision {0} cannot be used here")]
    GhostUnusableHere(String),

    // -- Graph errors --------------------------------------------------
    #[error("no common ancestor between {0} and {1}")]
    NoCommonAncestor(String, String),
    #[error("branches have diverged")]
    DivergedBranches,
    #[error("{0} is not an ancestor of {1}")]
    NotAncestor(String, String),
    #[error("cycle detected in graph")]
    GraphCycle,

    // -- Format errors --------------------------------------------------
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("unknown format signature: {0:?}")]
    UnknownFormat(Vec<u8>),
    #[error("incompatible format: {0}")]
    IncompatibleFormat(String),
    #[error("not a branch: {0}")]
    NotBranch(PathBuf),

    // -- Stream / store errors --------------------------------------------------
    #[error("bad index format signature in {0}")]
    BadIndexFormatSignature(String),
    #[error("bad index options in {0}")]
    BadIndexOptions(String),
    #[error("bad index data in {0}")]
    BadIndexData(String),
    #[error("bad index key: {0:?}")]
    BadIndexKey(Vec<u8>),
    #[error("bad index value: {0:?}")]
    BadIndexValue(Vec<u8>),
    #[error("duplicate key in index: {0:?}")]
    BadIndexDuplicateKey(Vec<u8>),
    #[error("checksum mismatch for {0}")]
    InvalidChecksum(String),
    #[error("missing text for {0}")]
    MissingText(String),

    // -- Transport errors --------------------------------------------------
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    #[error("invalid range request: {0}")]
    InvalidRange(String),
    #[error("invalid HTTP response: {0}")]
    InvalidHttpResponse(String),

    // -- Policy errors --------------------------------------------------
    #[error("disallowed url: {0}")]
    BadUrl(String),
    #[error("branch reference forbidden: {0}")]
    BranchReferenceForbidden(String),
    #[error("branch reference loop detected at {0}")]
    BranchLoopError(String),

    // -- Configuration errors --------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- IO passthrough --------------------------------------------------
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Internal --------------------------------------------------
    /// An invariant the engine itself is supposed to maintain was violated.
    /// Not a user error: the message is meant to be pasted into a bug report.
    #[error("internal error (please file a bug report): {0}")]
    Bug(String),
}

impl Error {
    /// True for errors that are ordinarily handled at the call site
    /// (e.g. probing for a branch's existence) rather than surfaced
    /// to the outermost caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoSuchFile(_)
                | Error::NoSuchRevision(_)
                | Error::UnknownFormat(_)
                | Error::NotBranch(_)
        )
    }
}

/// Builds an [`Error::Bug`] with a formatted message, the way
/// `crate::errors::programming(...)` does in the DAG engine this workspace
/// was grounded on.
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => {
        $crate::Error::Bug(format!($($arg)*))
    };
}
