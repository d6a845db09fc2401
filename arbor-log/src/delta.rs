//! Tree deltas: what changed between a revision's inventory and its
//! primary parent's, the Rust shape of `bzrlib.delta.TreeDelta`.

use arbor_model::{FileId, Inventory};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeltaEntry {
    pub file_id: FileId,
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Delta {
    pub entries: Vec<DeltaEntry>,
}

impl Delta {
    pub fn touches(&self, file_id: &FileId) -> bool {
        self.entries.iter().any(|e| &e.file_id == file_id)
    }

    /// A view of this delta containing only the entries naming one of
    /// `file_ids` — spec.md §4.8's `delta_type = partial`.
    pub fn restricted_to(&self, file_ids: &[FileId]) -> Delta {
        Delta {
            entries: self
                .entries
                .iter()
                .filter(|e| file_ids.contains(&e.file_id))
                .cloned()
                .collect(),
        }
    }
}

/// Compares `current` against `parent` (the primary, first-parent
/// inventory, or `None` for a root commit) and reports every
/// added/modified/removed entry. A file counts as modified when its
/// `text_sha1` differs, or (for entries without text, e.g. directories)
/// when its `revision` stamp differs — the inventory's own record of
/// "this entry last changed here".
pub fn compute_delta(current: &Inventory, parent: Option<&Inventory>) -> Delta {
    let mut entries = Vec::new();
    for entry in current.iter() {
        let path = current.path_for(&entry.file_id).unwrap_or_default();
        match parent.and_then(|p| p.get(&entry.file_id)) {
            None => entries.push(DeltaEntry {
                file_id: entry.file_id.clone(),
                path,
                kind: ChangeKind::Added,
            }),
            Some(prior) => {
                let changed = match (&entry.text_sha1, &prior.text_sha1) {
                    (Some(a), Some(b)) => a != b,
                    (None, None) => entry.revision != prior.revision,
                    _ => true,
                };
                if changed {
                    entries.push(DeltaEntry {
                        file_id: entry.file_id.clone(),
                        path,
                        kind: ChangeKind::Modified,
                    });
                }
            }
        }
    }
    if let Some(parent) = parent {
        for entry in parent.iter() {
            if current.get(&entry.file_id).is_none() {
                entries.push(DeltaEntry {
                    file_id: entry.file_id.clone(),
                    path: parent.path_for(&entry.file_id).unwrap_or_default(),
                    kind: ChangeKind::Removed,
                });
            }
        }
    }
    Delta { entries }
}
