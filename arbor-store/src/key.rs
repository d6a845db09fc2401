use std::fmt;

use arbor_model::{FileId, RevisionId};

/// The address space a versioned-file store reconstructs bytes under:
/// spec.md §4.2 names three kinds of record sharing one store —
/// revision serializations, inventory serializations, and per-file
/// texts keyed by `(file-id, version-id)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum RecordKey {
    Revision(RevisionId),
    Inventory(RevisionId),
    Text(FileId, RevisionId),
}

impl RecordKey {
    pub fn revision_id(&self) -> &RevisionId {
        match self {
            RecordKey::Revision(r) => r,
            RecordKey::Inventory(r) => r,
            RecordKey::Text(_, r) => r,
        }
    }

    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            RecordKey::Text(f, _) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Revision(r) => write!(f, "revision:{}", r),
            RecordKey::Inventory(r) => write!(f, "inventory:{}", r),
            RecordKey::Text(file_id, r) => write!(f, "text:{}:{}", file_id, r),
        }
    }
}
