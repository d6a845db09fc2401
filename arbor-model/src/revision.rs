use std::collections::BTreeMap;

use crate::ids::RevisionId;

/// One immutable tree snapshot. Once inserted into a store its
/// `revision_id` determines its identity forever: re-inserting the same
/// id with different content is a store-level error
/// (`RevisionAlreadyPresent`), not a mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub revision_id: RevisionId,
    pub committer: String,
    pub timestamp: f64,
    pub timezone: i32,
    pub message: String,
    pub parent_ids: Vec<RevisionId>,
    pub inventory_sha1: String,
    pub properties: BTreeMap<String, String>,
}

impl Revision {
    pub fn new(revision_id: RevisionId, inventory_sha1: impl Into<String>) -> Self {
        Revision {
            revision_id,
            committer: String::new(),
            timestamp: 0.0,
            timezone: 0,
            message: String::new(),
            parent_ids: Vec::new(),
            inventory_sha1: inventory_sha1.into(),
            properties: BTreeMap::new(),
        }
    }

    /// True for a revision with no recorded parents: either the first
    /// revision of a tree, or one whose sole parent is the implicit
    /// `NULL_REVISION`.
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}
