//! The `Repository`: owns the three versioned-file stores spec.md §4.4
//! names (revisions, inventories, per-file texts) plus a signature store,
//! and implements the fetch protocol (§4.4 steps 1-4) between two
//! repositories.
//!
//! Grounded on `bzrlib/repository.py`'s `Repository` (the
//! `get_revision`/`get_inventory`/`gather_stats` surface) and
//! `bzrlib/fetch.py`'s `RepoFetcher` for the fetch algorithm itself,
//! including the rich-root synthesis step and its `_parent_map`-style
//! cache (Open Question 1: cache the parent root-id).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sha1::{Digest, Sha1};

use arbor_errors::{Error, Result};
use arbor_graph::{Graph, HashMapParentsProvider};
use arbor_model::{FileId, Inventory, Revision, RevisionId};
use arbor_store::{RecordKey, WeaveStore};

use crate::codec::{deserialize_inventory, deserialize_revision, serialize_revision};
use crate::fetch_spec::FetchSpec;
use crate::format::Format;

/// One revision paired with the inventory it committed, the Rust
/// counterpart of `bzrlib.revisiontree.RevisionTree` without the
/// filesystem-materialization machinery this workspace has no use for.
#[derive(Clone, Debug, PartialEq)]
pub struct RevisionTree {
    pub revision: Revision,
    pub inventory: Inventory,
}

/// Summary statistics the way `bzrlib.info.gather_stats` reports them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryStats {
    pub revisions: usize,
    pub committers: usize,
    pub first_timestamp: Option<f64>,
    pub latest_timestamp: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub revisions_fetched: usize,
}

/// Owns the revision, inventory and per-file-text stores (plus
/// signatures) for one repository location. `order` records insertion
/// order so [`Repository::get_graph`] can assemble a full parent map
/// without the stores themselves needing to expose key enumeration.
pub struct Repository {
    format: Box<dyn Format>,
    revisions: WeaveStore,
    inventories: WeaveStore,
    texts: WeaveStore,
    signatures: HashMap<RevisionId, Vec<u8>>,
    order: Vec<RevisionId>,
    /// Open Question 1: the root file-id of each revision's inventory,
    /// cached at insertion time rather than recomputed by walking the
    /// parent's inventory on every rich-root lookup. Trades resident
    /// memory (one `FileId` per revision) for O(1) lookups during fetch.
    root_id_cache: HashMap<RevisionId, FileId>,
}

impl Repository {
    pub fn new(format: Box<dyn Format>) -> Self {
        Repository {
            format,
            revisions: WeaveStore::default(),
            inventories: WeaveStore::default(),
            texts: WeaveStore::default(),
            signatures: HashMap::new(),
            order: Vec::new(),
            root_id_cache: HashMap::new(),
        }
    }

    pub fn format(&self) -> &dyn Format {
        self.format.as_ref()
    }

    pub fn has_revision(&self, id: &RevisionId) -> bool {
        self.revisions.get_fulltext(&RecordKey::Revision(id.clone())).is_ok()
    }

    pub fn all_revision_ids(&self) -> &[RevisionId] {
        &self.order
    }

    /// Inserts a commit's full record set: the revision, the inventory it
    /// names, and the texts it introduces. `texts` are keyed by file-id;
    /// their parent text keys are derived from the same file-id's entry
    /// in each of `revision.parent_ids`' already-stored inventories.
    pub fn add_revision(
        &mut self,
        revision: Revision,
        inventory: Inventory,
        texts: Vec<(FileId, Vec<u8>)>,
    ) -> Result<()> {
        let canonical = inventory.to_canonical_bytes();
        let actual_sha1 = sha1_hex(&canonical);
        if actual_sha1 != revision.inventory_sha1 {
            return Err(Error::InvalidChecksum(revision.revision_id.to_string()));
        }

        let rev_key = RecordKey::Revision(revision.revision_id.clone());
        let parent_rev_keys: Vec<RecordKey> = revision
            .parent_ids
            .iter()
            .filter(|p| !p.is_null())
            .map(|p| RecordKey::Revision(p.clone()))
            .collect();
        let parent_inv_keys: Vec<RecordKey> = revision
            .parent_ids
            .iter()
            .filter(|p| !p.is_null())
            .map(|p| RecordKey::Inventory(p.clone()))
            .collect();

        self.revisions
            .add(rev_key, parent_rev_keys, &serialize_revision(&revision))?;
        self.inventories.add(
            RecordKey::Inventory(revision.revision_id.clone()),
            parent_inv_keys,
            &canonical,
        )?;

        for (file_id, bytes) in texts {
            let parents = self.text_parent_keys(&file_id, &revision.parent_ids);
            self.texts
                .add(RecordKey::Text(file_id, revision.revision_id.clone()), parents, &bytes)?;
        }

        if let Some(root) = inventory.root() {
            self.root_id_cache
                .insert(revision.revision_id.clone(), root.file_id.clone());
        }
        self.order.push(revision.revision_id.clone());
        Ok(())
    }

    /// The text keys `file_id` had in each of `parent_ids`' inventories,
    /// falling back to a direct inventory lookup when a parent's root-id
    /// is not yet cached (e.g. when fetching into an empty target).
    fn text_parent_keys(&self, file_id: &FileId, parent_ids: &[RevisionId]) -> Vec<RecordKey> {
        let mut keys = Vec::new();
        for parent_id in parent_ids {
            if parent_id.is_null() {
                continue;
            }
            if let Ok(inv) = self.get_inventory(parent_id) {
                if let Some(entry) = inv.get(file_id) {
                    let key = RecordKey::Text(file_id.clone(), entry.revision.clone());
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
        }
        keys
    }

    pub fn get_revision(&self, id: &RevisionId) -> Result<Revision> {
        let bytes = self
            .revisions
            .get_fulltext(&RecordKey::Revision(id.clone()))
            .map_err(|_| Error::NoSuchRevision(id.to_string()))?;
        deserialize_revision(&bytes)
    }

    pub fn get_inventory(&self, id: &RevisionId) -> Result<Inventory> {
        let bytes = self
            .inventories
            .get_fulltext(&RecordKey::Inventory(id.clone()))
            .map_err(|_| Error::NoSuchRevision(id.to_string()))?;
        deserialize_inventory(&bytes)
    }

    pub fn revision_tree(&self, id: &RevisionId) -> Result<RevisionTree> {
        Ok(RevisionTree {
            revision: self.get_revision(id)?,
            inventory: self.get_inventory(id)?,
        })
    }

    pub fn get_text(&self, file_id: &FileId, revision_id: &RevisionId) -> Result<Vec<u8>> {
        self.texts
            .get_fulltext(&RecordKey::Text(file_id.clone(), revision_id.clone()))
            .map_err(|_| Error::MissingText(format!("{file_id}@{revision_id}")))
    }

    pub fn add_signature(&mut self, id: RevisionId, signature: Vec<u8>) {
        self.signatures.insert(id, signature);
    }

    pub fn get_signature(&self, id: &RevisionId) -> Option<&[u8]> {
        self.signatures.get(id).map(|v| v.as_slice())
    }

    /// Assembles a full in-memory parent map over every revision this
    /// repository holds and wraps it as a [`Graph`]. Acceptable for a
    /// repository whose history fits in memory; `KnownGraph` (in
    /// `arbor-graph`) is the accelerated form once that map is in hand.
    pub fn get_graph(&self) -> Result<Graph<HashMapParentsProvider>> {
        let mut map = HashMap::with_capacity(self.order.len());
        for id in &self.order {
            let rev = self.get_revision(id)?;
            map.insert(id.clone(), rev.parent_ids);
        }
        Ok(Graph::new(Arc::new(HashMapParentsProvider::new(map))))
    }

    /// The heads of every revision this repository holds: its tips.
    pub fn tips(&self) -> Result<HashSet<RevisionId>> {
        let graph = self.get_graph()?;
        let all: HashSet<RevisionId> = self.order.iter().cloned().collect();
        if all.is_empty() {
            return Ok(HashSet::new());
        }
        graph.heads(&all)
    }

    pub fn gather_stats(&self) -> Result<RepositoryStats> {
        let mut committers: HashSet<String> = HashSet::new();
        let mut first_timestamp: Option<f64> = None;
        let mut latest_timestamp: Option<f64> = None;
        for id in &self.order {
            let rev = self.get_revision(id)?;
            committers.insert(rev.committer);
            first_timestamp = Some(match first_timestamp {
                Some(t) if t <= rev.timestamp => t,
                _ => rev.timestamp,
            });
            latest_timestamp = Some(match latest_timestamp {
                Some(t) if t >= rev.timestamp => t,
                _ => rev.timestamp,
            });
        }
        Ok(RepositoryStats {
            revisions: self.order.len(),
            committers: committers.len(),
            first_timestamp,
            latest_timestamp,
        })
    }

    /// spec.md §4.4's fetch protocol: resolve the revision set to
    /// transfer (step 1), stream revision/inventory/text records for it
    /// (step 2), insert into `self` with a resolve-missing-parents retry
    /// (step 3), and synthesize rich-root texts on a format upgrade
    /// (step 4). Fetching the same spec twice is a no-op after the
    /// first: every record `add` is idempotent for identical content.
    #[tracing::instrument(skip(self, source, fetch_spec))]
    pub fn fetch(
        &mut self,
        source: &Repository,
        last_revision: Option<RevisionId>,
        find_ghosts: bool,
        fetch_spec: Option<FetchSpec>,
    ) -> Result<FetchStats> {
        if let Some(FetchSpec::Explicit { keys }) = fetch_spec {
            return self.fetch_explicit_keys(source, keys);
        }

        let spec = match (fetch_spec, last_revision) {
            (Some(spec), _) => spec,
            (None, Some(rev)) => FetchSpec::NotInOther { heads: vec![rev] },
            (None, None) => FetchSpec::Everything,
        };

        if spec.is_empty_null_fetch() {
            return Ok(FetchStats::default());
        }

        let heads: Vec<RevisionId> = match &spec {
            FetchSpec::NotInOther { heads } => heads.clone(),
            FetchSpec::Everything => source.tips()?.into_iter().collect(),
            FetchSpec::Explicit { .. } => unreachable!("handled above"),
        };

        let source_graph = source.get_graph()?;
        let mut to_fetch = HashSet::new();
        for head in &heads {
            if head.is_null() {
                continue;
            }
            if !find_ghosts && !source.has_revision(head) {
                return Err(Error::GhostUnusableHere(head.to_string()));
            }
            to_fetch.extend(source_graph.ancestors_of(vec![head.clone()])?);
        }
        to_fetch.retain(|id| !self.has_revision(id));
        if to_fetch.is_empty() {
            return Ok(FetchStats::default());
        }

        let ordered = source_graph.iter_topo_order(&to_fetch)?;
        self.transfer(source, &ordered)?;
        self.synthesize_rich_roots(source, &ordered)?;

        Ok(FetchStats {
            revisions_fetched: ordered.len(),
        })
    }

    fn fetch_explicit_keys(&mut self, source: &Repository, keys: Vec<RecordKey>) -> Result<FetchStats> {
        let mut rev_stream = Vec::new();
        let mut inv_stream = Vec::new();
        let mut text_stream = Vec::new();
        let mut revisions_fetched = 0usize;
        for key in keys {
            match &key {
                RecordKey::Revision(_) => {
                    let bytes = source.revisions.get_fulltext(&key)?;
                    let parents = source.revisions.get_parent_map(&[key.clone()]);
                    rev_stream.push((key.clone(), parents.get(&key).cloned().unwrap_or_default(), bytes));
                    revisions_fetched += 1;
                }
                RecordKey::Inventory(_) => {
                    let bytes = source.inventories.get_fulltext(&key)?;
                    let parents = source.inventories.get_parent_map(&[key.clone()]);
                    inv_stream.push((key.clone(), parents.get(&key).cloned().unwrap_or_default(), bytes));
                }
                RecordKey::Text(_, _) => {
                    let bytes = source.texts.get_fulltext(&key)?;
                    let parents = source.texts.get_parent_map(&[key.clone()]);
                    text_stream.push((key.clone(), parents.get(&key).cloned().unwrap_or_default(), bytes));
                }
            }
        }
        let (_, missing_rev) = self.revisions.insert_stream(rev_stream)?;
        let (_, missing_inv) = self.inventories.insert_stream(inv_stream)?;
        let (_, missing_text) = self.texts.insert_stream(text_stream)?;
        if !missing_rev.is_empty() || !missing_inv.is_empty() || !missing_text.is_empty() {
            return Err(Error::Bug(
                "fetch stream left unresolved keys after retry".to_string(),
            ));
        }
        Ok(FetchStats { revisions_fetched })
    }

    /// Step 2-3: builds the revision/inventory/text stream for `ordered`
    /// and inserts it into `self`, failing loudly if any key is still
    /// unresolved after `insert_stream`'s own fixpoint retry — per
    /// spec.md §4.4 step 3, an unresolved second pass is fatal.
    fn transfer(&mut self, source: &Repository, ordered: &[RevisionId]) -> Result<()> {
        let mut rev_stream = Vec::new();
        let mut inv_stream = Vec::new();
        let mut text_stream = Vec::new();

        for id in ordered {
            let revision = source.get_revision(id)?;
            let inventory = source.get_inventory(id)?;

            let rev_key = RecordKey::Revision(id.clone());
            let rev_parents: Vec<RecordKey> = revision
                .parent_ids
                .iter()
                .filter(|p| !p.is_null())
                .map(|p| RecordKey::Revision(p.clone()))
                .collect();
            rev_stream.push((rev_key, rev_parents, serialize_revision(&revision)));

            let inv_key = RecordKey::Inventory(id.clone());
            let inv_parents: Vec<RecordKey> = revision
                .parent_ids
                .iter()
                .filter(|p| !p.is_null())
                .map(|p| RecordKey::Inventory(p.clone()))
                .collect();
            inv_stream.push((inv_key, inv_parents, inventory.to_canonical_bytes()));

            for entry in inventory.iter() {
                if &entry.revision != id {
                    continue;
                }
                if entry.text_sha1.is_none() {
                    continue;
                }
                let text_key = RecordKey::Text(entry.file_id.clone(), id.clone());
                let bytes = source.get_text(&entry.file_id, id)?;
                let parents = source.text_parent_keys(&entry.file_id, &revision.parent_ids);
                text_stream.push((text_key, parents, bytes));
            }
        }

        let (_, missing_rev) = self.revisions.insert_stream(rev_stream)?;
        let (_, missing_inv) = self.inventories.insert_stream(inv_stream)?;
        let (_, missing_text) = self.texts.insert_stream(text_stream)?;
        if !missing_rev.is_empty() || !missing_inv.is_empty() || !missing_text.is_empty() {
            return Err(Error::Bug(
                "fetch stream left unresolved keys after retry".to_string(),
            ));
        }
        for id in ordered {
            self.order.push(id.clone());
            if let Ok(inv) = self.get_inventory(id) {
                if let Some(root) = inv.root() {
                    self.root_id_cache.insert(id.clone(), root.file_id.clone());
                }
            }
        }
        Ok(())
    }

    /// Step 4: when `source` is non-rich-root and `self` is rich-root,
    /// synthesize a root text record for every fetched revision. The
    /// synthesized parent set is the heads among parent revisions' root
    /// texts sharing the same root file-id, falling back to a fresh
    /// lookup when a parent's root-id was not cached (Open Question 1).
    fn synthesize_rich_roots(&mut self, source: &Repository, ordered: &[RevisionId]) -> Result<()> {
        if source.format.rich_root_data() || !self.format.rich_root_data() {
            return Ok(());
        }
        for id in ordered {
            let inventory = self.get_inventory(id)?;
            let root_id = match inventory.root() {
                Some(root) => root.file_id.clone(),
                None => continue,
            };
            let revision = self.get_revision(id)?;

            let mut parent_keys = Vec::new();
            for parent_id in &revision.parent_ids {
                if parent_id.is_null() {
                    continue;
                }
                let parent_root = match self.root_id_cache.get(parent_id) {
                    Some(r) => r.clone(),
                    None => match self.get_inventory(parent_id) {
                        Ok(inv) => match inv.root() {
                            Some(r) => r.file_id.clone(),
                            None => continue,
                        },
                        Err(_) => continue,
                    },
                };
                if parent_root == root_id {
                    parent_keys.push(RecordKey::Text(root_id.clone(), parent_id.clone()));
                }
            }

            let text_key = RecordKey::Text(root_id.clone(), id.clone());
            let placeholder = root_id.as_str().as_bytes().to_vec();
            self.texts.add(text_key, parent_keys, &placeholder)?;
        }
        Ok(())
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Knit1Format, RichRootFormat};
    use arbor_model::{EntryKind, InventoryEntry};

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }
    fn fid(s: &str) -> FileId {
        FileId::new(s).unwrap()
    }

    fn commit(repo: &mut Repository, id: &str, parents: Vec<RevisionId>, file_text: Option<&str>) {
        let root = fid("root");
        let mut inv = if let Some(parent) = parents.first().filter(|p| !p.is_null()) {
            repo.get_inventory(parent).unwrap()
        } else {
            Inventory::empty_tree(root.clone())
        };
        if let Some(text) = file_text {
            let sha1 = sha1_hex(text.as_bytes());
            inv.add(InventoryEntry {
                file_id: fid("f1"),
                kind: EntryKind::File,
                name: "f1.txt".to_string(),
                parent_id: Some(root),
                revision: rid(id),
                text_sha1: Some(sha1),
                text_size: Some(text.len() as u64),
                symlink_target: None,
            })
            .unwrap();
        }
        let canonical = inv.to_canonical_bytes();
        let inv_sha1 = sha1_hex(&canonical);
        let mut rev = Revision::new(rid(id), inv_sha1);
        rev.committer = "tester".to_string();
        rev.parent_ids = parents;
        let texts = file_text
            .map(|t| vec![(fid("f1"), t.as_bytes().to_vec())])
            .unwrap_or_default();
        repo.add_revision(rev, inv, texts).unwrap();
    }

    #[test]
    fn round_trips_a_committed_revision() {
        let mut repo = Repository::new(Box::new(Knit1Format));
        commit(&mut repo, "r1", vec![], Some("hello"));
        let tree = repo.revision_tree(&rid("r1")).unwrap();
        assert_eq!(tree.revision.revision_id, rid("r1"));
        assert_eq!(repo.get_text(&fid("f1"), &rid("r1")).unwrap(), b"hello");
    }

    #[test]
    fn add_revision_rejects_mismatched_inventory_sha1() {
        let mut repo = Repository::new(Box::new(Knit1Format));
        let inv = Inventory::empty_tree(fid("root"));
        let rev = Revision::new(rid("r1"), "not-the-real-sha1");
        assert!(matches!(
            repo.add_revision(rev, inv, vec![]),
            Err(Error::InvalidChecksum(_))
        ));
    }

    #[test]
    fn gather_stats_counts_distinct_committers() {
        let mut repo = Repository::new(Box::new(Knit1Format));
        commit(&mut repo, "r1", vec![], None);
        commit(&mut repo, "r2", vec![rid("r1")], None);
        let stats = repo.gather_stats().unwrap();
        assert_eq!(stats.revisions, 2);
        assert_eq!(stats.committers, 1);
    }

    #[test]
    fn fetch_linear_pull_transfers_all_new_revisions() {
        let mut source = Repository::new(Box::new(Knit1Format));
        commit(&mut source, "r1", vec![], Some("a"));
        commit(&mut source, "r2", vec![rid("r1")], Some("ab"));
        commit(&mut source, "r3", vec![rid("r2")], Some("abc"));

        let mut target = Repository::new(Box::new(Knit1Format));
        commit(&mut target, "r1", vec![], Some("a"));

        let stats = target
            .fetch(&source, Some(rid("r3")), true, None)
            .unwrap();
        assert_eq!(stats.revisions_fetched, 2);
        assert!(target.has_revision(&rid("r2")));
        assert!(target.has_revision(&rid("r3")));
        assert_eq!(target.get_text(&fid("f1"), &rid("r3")).unwrap(), b"abc");
    }

    #[test]
    fn fetch_is_idempotent() {
        let mut source = Repository::new(Box::new(Knit1Format));
        commit(&mut source, "r1", vec![], Some("a"));
        commit(&mut source, "r2", vec![rid("r1")], Some("ab"));

        let mut target = Repository::new(Box::new(Knit1Format));
        target.fetch(&source, None, true, None).unwrap();
        let first_count = target.all_revision_ids().len();
        target.fetch(&source, None, true, None).unwrap();
        assert_eq!(target.all_revision_ids().len(), first_count);
    }

    #[test]
    fn fetch_with_null_last_revision_transfers_nothing() {
        let mut source = Repository::new(Box::new(Knit1Format));
        commit(&mut source, "r1", vec![], Some("a"));

        let mut target = Repository::new(Box::new(Knit1Format));
        let stats = target
            .fetch(&source, Some(RevisionId::null()), true, None)
            .unwrap();
        assert_eq!(stats.revisions_fetched, 0);
        assert!(!target.has_revision(&rid("r1")));
    }

    #[test]
    fn fetch_synthesizes_root_texts_on_rich_root_upgrade() {
        let mut source = Repository::new(Box::new(Knit1Format));
        commit(&mut source, "r1", vec![], Some("a"));
        commit(&mut source, "r2", vec![rid("r1")], Some("ab"));

        let mut target = Repository::new(Box::new(RichRootFormat));
        target.fetch(&source, None, true, None).unwrap();

        assert!(target
            .get_text(&fid("root"), &rid("r1"))
            .is_ok());
        assert!(target
            .get_text(&fid("root"), &rid("r2"))
            .is_ok());
    }
}
