//! The [`ParentsProvider`] capability: the single query the graph engine
//! needs answered, `parents_of(keys) -> {key: parents}`, with keys absent
//! from the map treated as ghosts.

use std::collections::HashMap;

use arbor_errors::Result;
use arbor_model::RevisionId;

/// Answers "what are the parents of these revisions" for a batch of keys
/// at once, the way a versioned-file store's `get_parent_map` does: a
/// present key with an empty parent list has no parents other than NULL;
/// a key absent from the returned map is a ghost.
pub trait ParentsProvider {
    fn parents_of(&self, keys: &[RevisionId]) -> Result<HashMap<RevisionId, Vec<RevisionId>>>;
}

/// An in-memory [`ParentsProvider`] over a fixed parent map, the Rust
/// shape of `bzrlib.graph.DictParentsProvider` — used by tests and by
/// callers building ancestry over a repository's revision store, which
/// can batch-load the whole map up front.
#[derive(Clone, Debug, Default)]
pub struct HashMapParentsProvider {
    map: HashMap<RevisionId, Vec<RevisionId>>,
}

impl HashMapParentsProvider {
    pub fn new(map: HashMap<RevisionId, Vec<RevisionId>>) -> Self {
        HashMapParentsProvider { map }
    }

    pub fn insert(&mut self, key: RevisionId, parents: Vec<RevisionId>) {
        self.map.insert(key, parents);
    }

    pub fn keys(&self) -> impl Iterator<Item = &RevisionId> {
        self.map.keys()
    }

    pub fn as_map(&self) -> &HashMap<RevisionId, Vec<RevisionId>> {
        &self.map
    }
}

impl ParentsProvider for HashMapParentsProvider {
    fn parents_of(&self, keys: &[RevisionId]) -> Result<HashMap<RevisionId, Vec<RevisionId>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(parents) = self.map.get(key) {
                out.insert(key.clone(), parents.clone());
            }
        }
        Ok(out)
    }
}

impl<T: ParentsProvider + ?Sized> ParentsProvider for std::sync::Arc<T> {
    fn parents_of(&self, keys: &[RevisionId]) -> Result<HashMap<RevisionId, Vec<RevisionId>>> {
        (**self).parents_of(keys)
    }
}
