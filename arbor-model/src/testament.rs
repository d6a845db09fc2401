use blake2::{Blake2b, Digest};

use crate::inventory::Inventory;
use crate::revision::Revision;

/// A canonical textual digest of a revision's identifying fields plus its
/// inventory's file-id to text-sha1 map. Two implementations that produce
/// the same testament for the same revision agree on everything a
/// signature actually covers, independent of incidental serialization
/// differences elsewhere.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Testament {
    text: String,
}

impl Testament {
    pub fn from_revision(revision: &Revision, inventory: &Inventory) -> Self {
        let mut text = String::new();
        text.push_str("arbor-testament-1\n");
        text.push_str("revision-id: ");
        text.push_str(revision.revision_id.as_str());
        text.push('\n');
        text.push_str("committer: ");
        text.push_str(&revision.committer);
        text.push('\n');
        text.push_str("timestamp: ");
        text.push_str(&revision.timestamp.to_string());
        text.push('\n');
        text.push_str("timezone: ");
        text.push_str(&revision.timezone.to_string());
        text.push('\n');
        text.push_str("message: ");
        text.push_str(&revision.message);
        text.push('\n');
        text.push_str("parents:\n");
        for parent in &revision.parent_ids {
            text.push_str("  ");
            text.push_str(parent.as_str());
            text.push('\n');
        }
        text.push_str("properties:\n");
        for (k, v) in &revision.properties {
            text.push_str("  ");
            text.push_str(k);
            text.push_str(": ");
            text.push_str(v);
            text.push('\n');
        }
        text.push_str("inventory:\n");
        for (file_id, sha1) in inventory.text_sha1_map() {
            text.push_str("  ");
            text.push_str(file_id.as_str());
            text.push_str(": ");
            text.push_str(&sha1);
            text.push('\n');
        }
        Testament { text }
    }

    /// The canonical text this testament was built from: the payload a
    /// `SignStrategy` signs.
    pub fn as_text(&self) -> &str {
        &self.text
    }

    /// Binary digest of [`Self::as_text`], for callers that want a fixed-size
    /// identifier rather than the full canonical text.
    pub fn digest(&self) -> Vec<u8> {
        let mut hasher = Blake2b::new();
        hasher.update(self.text.as_bytes());
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FileId, RevisionId};
    use crate::inventory::InventoryEntry;

    #[test]
    fn same_inputs_produce_identical_testament() {
        let root = FileId::new("root-id").unwrap();
        let inv = Inventory::empty_tree(root);
        let rev = Revision::new(RevisionId::new("r1").unwrap(), "deadbeef");
        let t1 = Testament::from_revision(&rev, &inv);
        let t2 = Testament::from_revision(&rev, &inv);
        assert_eq!(t1, t2);
        assert_eq!(t1.digest(), t2.digest());
    }

    #[test]
    fn differing_messages_produce_differing_testaments() {
        let root = FileId::new("root-id").unwrap();
        let inv = Inventory::empty_tree(root);
        let mut rev = Revision::new(RevisionId::new("r1").unwrap(), "deadbeef");
        let t1 = Testament::from_revision(&rev, &inv);
        rev.message = "changed".into();
        let t2 = Testament::from_revision(&rev, &inv);
        assert_ne!(t1, t2);
    }

    #[test]
    fn symlink_entry_excluded_from_text_map() {
        let root = FileId::new("root-id").unwrap();
        let mut inv = Inventory::empty_tree(root.clone());
        inv.add(InventoryEntry {
            file_id: FileId::new("link-1").unwrap(),
            kind: crate::inventory::EntryKind::Symlink,
            name: "l".into(),
            parent_id: Some(root),
            revision: RevisionId::new("r1").unwrap(),
            text_sha1: None,
            text_size: None,
            symlink_target: Some("target".into()),
        })
        .unwrap();
        assert!(inv.text_sha1_map().is_empty());
    }
}
