//! The weave/knit versioned-file store (spec.md §4.2): reconstructs
//! revision, inventory and per-file-text byte sequences addressed by
//! [`RecordKey`], plus the on-disk Graph-Index format used to persist
//! key/parent/value triples bit-exactly.

pub mod delta;
pub mod graph_index;
pub mod key;
pub mod weave;

pub use delta::{apply_delta, diff_bytes, DeltaOp};
pub use graph_index::{GraphIndex, GraphIndexBuilder, GraphIndexEntry};
pub use key::RecordKey;
pub use weave::WeaveStore;
