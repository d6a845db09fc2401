//! The versioned-file store: spec.md §4.2's weave/knit model layered
//! over [`crate::delta`]. Each record is either a fulltext or a delta
//! against one parent; a fresh fulltext is inserted whenever the delta
//! chain since the last fulltext would exceed
//! [`WeaveStore::fulltext_interval`], bounding reconstruction cost the
//! way `bzrlib`'s knit format does by inserting a fulltext "every N
//! deltas" (spec.md §4.2 leaves the exact policy implementation-defined).

use std::collections::HashMap;

use sha1::{Digest, Sha1};

use arbor_errors::{Error, Result};

use crate::delta::{apply_delta, diff_bytes, DeltaOp};
use crate::key::RecordKey;

enum Record {
    Fulltext(Vec<u8>),
    Delta { base: RecordKey, ops: Vec<DeltaOp> },
}

struct Entry {
    parent_keys: Vec<RecordKey>,
    sha1: String,
    record: Record,
    depth: u32,
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A weave/knit-style versioned-file store keyed by [`RecordKey`].
pub struct WeaveStore {
    entries: HashMap<RecordKey, Entry>,
    order: Vec<RecordKey>,
    fulltext_interval: u32,
}

impl Default for WeaveStore {
    fn default() -> Self {
        Self::new(200)
    }
}

impl WeaveStore {
    pub fn new(fulltext_interval: u32) -> Self {
        WeaveStore {
            entries: HashMap::new(),
            order: Vec::new(),
            fulltext_interval,
        }
    }

    /// Idempotent when `key` is already present with identical parents
    /// and content; fails with [`Error::RevisionAlreadyPresent`] if the
    /// key exists with different parents or bytes.
    pub fn add(&mut self, key: RecordKey, parent_keys: Vec<RecordKey>, bytes: &[u8]) -> Result<()> {
        let digest = sha1_hex(bytes);
        if let Some(existing) = self.entries.get(&key) {
            if existing.sha1 == digest && existing.parent_keys == parent_keys {
                return Ok(());
            }
            return Err(Error::RevisionAlreadyPresent(key.to_string()));
        }

        let base_entry = parent_keys.first().and_then(|base| self.entries.get(base));
        let (record, depth) = match base_entry {
            Some(base) if base.depth + 1 < self.fulltext_interval => {
                let base_key = parent_keys[0].clone();
                let base_fulltext = self.get_fulltext(&base_key)?;
                let ops = diff_bytes(&base_fulltext, bytes);
                (
                    Record::Delta {
                        base: base_key,
                        ops,
                    },
                    base.depth + 1,
                )
            }
            _ => (Record::Fulltext(bytes.to_vec()), 0),
        };

        self.entries.insert(
            key.clone(),
            Entry {
                parent_keys,
                sha1: digest,
                record,
                depth,
            },
        );
        self.order.push(key);
        Ok(())
    }

    /// Reconstructs the content for `key`, following the delta chain
    /// back to its fulltext and verifying the SHA-1 recorded at insert
    /// time still matches.
    pub fn get_fulltext(&self, key: &RecordKey) -> Result<Vec<u8>> {
        let mut chain = Vec::new();
        let mut current = key.clone();
        let bytes = loop {
            let entry = self
                .entries
                .get(&current)
                .ok_or_else(|| Error::NoSuchRevision(current.to_string()))?;
            match &entry.record {
                Record::Fulltext(bytes) => break bytes.clone(),
                Record::Delta { base, ops } => {
                    chain.push(ops);
                    current = base.clone();
                }
            }
        };
        let mut fulltext = bytes;
        for ops in chain.into_iter().rev() {
            fulltext = apply_delta(&fulltext, ops);
        }
        let entry = &self.entries[key];
        if sha1_hex(&fulltext) != entry.sha1 {
            return Err(Error::InvalidChecksum(key.to_string()));
        }
        Ok(fulltext)
    }

    /// Parents of each present key in `keys`; keys absent from the
    /// store are simply omitted from the returned map (a ghost from the
    /// graph engine's point of view).
    pub fn get_parent_map(&self, keys: &[RecordKey]) -> HashMap<RecordKey, Vec<RecordKey>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.entries.get(key) {
                out.insert(key.clone(), entry.parent_keys.clone());
            }
        }
        out
    }

    /// Bulk ingest: records whose parents are not yet present (in the
    /// store or earlier in this same stream) are deferred; a key that
    /// never becomes insertable across the whole stream is reported
    /// back in `missing_keys` rather than failing the whole batch.
    pub fn insert_stream(
        &mut self,
        stream: Vec<(RecordKey, Vec<RecordKey>, Vec<u8>)>,
    ) -> Result<(Vec<RecordKey>, Vec<RecordKey>)> {
        let mut pending = stream;
        let mut inserted = Vec::new();
        loop {
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for (key, parents, bytes) in pending {
                let ready = parents
                    .iter()
                    .all(|p| self.entries.contains_key(p) || p.revision_id().is_null());
                if ready {
                    self.add(key.clone(), parents, &bytes)?;
                    inserted.push(key);
                    progressed = true;
                } else {
                    still_pending.push((key, parents, bytes));
                }
            }
            pending = still_pending;
            if pending.is_empty() || !progressed {
                break;
            }
        }
        let missing_keys: Vec<RecordKey> = pending.into_iter().map(|(k, _, _)| k).collect();
        tracing::debug!(inserted = inserted.len(), missing = missing_keys.len(), "insert_stream");
        Ok((inserted, missing_keys))
    }

    /// All `Text` records for `file_id`, in insertion order.
    pub fn iter_entries_by_file_id<'a>(
        &'a self,
        file_id: &'a arbor_model::FileId,
    ) -> impl Iterator<Item = &'a RecordKey> + 'a {
        self.order
            .iter()
            .filter(move |key| key.file_id() == Some(file_id))
    }
}
