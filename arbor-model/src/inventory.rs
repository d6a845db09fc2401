use std::collections::BTreeMap;
use std::fmt::Write as _;

use arbor_errors::{Error, Result};

use crate::ids::{FileId, RevisionId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    TreeReference,
}

impl EntryKind {
    fn tag(&self) -> &'static str {
        match self {
            EntryKind::Directory => "dir",
            EntryKind::File => "file",
            EntryKind::Symlink => "symlink",
            EntryKind::TreeReference => "tree-reference",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        Ok(match tag {
            "dir" => EntryKind::Directory,
            "file" => EntryKind::File,
            "symlink" => EntryKind::Symlink,
            "tree-reference" => EntryKind::TreeReference,
            other => {
                return Err(Error::Bug(format!("unknown inventory entry kind {other:?}")))
            }
        })
    }
}

/// A single tracked entry: a file, directory, symlink or tree-reference.
///
/// `parent_id` is `None` only for the tree root. File-specific attributes
/// (`text_sha1`, `text_size`, `symlink_target`) are populated according to
/// `kind` and left at their defaults otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct InventoryEntry {
    pub file_id: FileId,
    pub kind: EntryKind,
    pub name: String,
    pub parent_id: Option<FileId>,
    pub revision: RevisionId,
    pub text_sha1: Option<String>,
    pub text_size: Option<u64>,
    pub symlink_target: Option<String>,
}

impl InventoryEntry {
    pub fn root(file_id: FileId, revision: RevisionId) -> Self {
        InventoryEntry {
            file_id,
            kind: EntryKind::Directory,
            name: String::new(),
            parent_id: None,
            revision,
            text_sha1: None,
            text_size: None,
            symlink_target: None,
        }
    }
}

/// A tree of [`InventoryEntry`] values keyed by file-id, describing one
/// snapshot of a tracked filesystem tree.
///
/// Invariant: exactly one root entry (`parent_id == None`); every other
/// entry's `parent_id` names a directory entry present in the same
/// inventory. Paths are derivable by walking `parent_id` links; this type
/// does not cache them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    entries: BTreeMap<FileId, InventoryEntry>,
    root_id: Option<FileId>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn add(&mut self, entry: InventoryEntry) -> Result<()> {
        if entry.parent_id.is_none() {
            if self.root_id.is_some() {
                return Err(Error::Bug(
                    "inventory may have only one root entry".to_string(),
                ));
            }
            self.root_id = Some(entry.file_id.clone());
        } else if let Some(parent_id) = &entry.parent_id {
            match self.entries.get(parent_id) {
                Some(parent) if parent.kind == EntryKind::Directory => {}
                Some(_) => {
                    return Err(Error::Bug(format!(
                        "parent {parent_id:?} of {:?} is not a directory",
                        entry.file_id
                    )))
                }
                None => {
                    return Err(Error::Bug(format!(
                        "parent {parent_id:?} of {:?} not present in inventory",
                        entry.file_id
                    )))
                }
            }
        }
        self.entries.insert(entry.file_id.clone(), entry);
        Ok(())
    }

    pub fn get(&self, file_id: &FileId) -> Option<&InventoryEntry> {
        self.entries.get(file_id)
    }

    pub fn root(&self) -> Option<&InventoryEntry> {
        self.root_id.as_ref().and_then(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values()
    }

    /// The filesystem path of `file_id`, built by walking `parent_id` links.
    pub fn path_for(&self, file_id: &FileId) -> Result<String> {
        let mut parts = Vec::new();
        let mut current = self
            .entries
            .get(file_id)
            .ok_or_else(|| Error::Bug(format!("{file_id:?} not present in inventory")))?;
        loop {
            if current.parent_id.is_none() {
                break;
            }
            parts.push(current.name.clone());
            let parent_id = current.parent_id.as_ref().unwrap();
            current = self
                .entries
                .get(parent_id)
                .ok_or_else(|| Error::Bug(format!("dangling parent {parent_id:?}")))?;
        }
        parts.reverse();
        Ok(parts.join("/"))
    }

    /// The inventory with a single empty root directory — the implicit
    /// parent tree of a first commit.
    pub fn empty_tree(root_id: FileId) -> Self {
        let mut inv = Inventory::new();
        inv.add(InventoryEntry::root(root_id, RevisionId::null()))
            .expect("a lone root entry is always valid");
        inv
    }

    /// Serializes the inventory to its canonical, byte-stable form.
    /// Entries are emitted in file-id order (the `BTreeMap`'s natural
    /// order) so re-serializing a parsed inventory reproduces the same
    /// bytes every time.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("<inventory>\n");
        for entry in self.entries.values() {
            let parent = entry
                .parent_id
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            write!(
                out,
                "<entry file_id={:?} kind={:?} name={:?} parent_id={:?} revision={:?} text_sha1={:?} text_size={:?} symlink_target={:?} />\n",
                entry.file_id.as_str(),
                entry.kind.tag(),
                entry.name,
                parent,
                entry.revision.as_str(),
                entry.text_sha1.as_deref().unwrap_or(""),
                entry.text_size.map(|s| s.to_string()).unwrap_or_default(),
                entry.symlink_target.as_deref().unwrap_or(""),
            )
            .expect("writing to a String never fails");
        }
        out.push_str("</inventory>\n");
        out.into_bytes()
    }

    /// The file-id → text-sha1 map used by [`crate::testament::Testament`].
    pub fn text_sha1_map(&self) -> BTreeMap<FileId, String> {
        self.entries
            .iter()
            .filter_map(|(id, e)| e.text_sha1.clone().map(|sha| (id.clone(), sha)))
            .collect()
    }
}
