//! Parallel breadth-first ancestry search — the Rust shape of bzrlib's
//! `_BreadthFirstSearcher`: a searcher seeded with a set of revisions that
//! expands one layer of parents per [`step`](BreadthFirstSearcher::step),
//! tracking which revisions it has already seen and which have been
//! explicitly excluded from further expansion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_errors::Result;
use arbor_model::RevisionId;

use crate::parents::ParentsProvider;

/// One layer of expansion: the present ancestors and ghosts discovered by
/// querying the current frontier's parents. Both are empty once the
/// search is exhausted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepResult {
    pub new_present: HashSet<RevisionId>,
    pub new_ghosts: HashSet<RevisionId>,
}

impl StepResult {
    pub fn is_empty(&self) -> bool {
        self.new_present.is_empty() && self.new_ghosts.is_empty()
    }
}

/// A breadth-first search over ancestry, seeded with a starting set and
/// expanded one layer at a time. Ghosts (revisions referenced as parents
/// but absent from the parent map) become implicit stop points so that
/// later backfill of the ghost does not change historical answers.
pub struct BreadthFirstSearcher<P> {
    parents: Arc<P>,
    seen: HashSet<RevisionId>,
    frontier: HashSet<RevisionId>,
    stopped: HashSet<RevisionId>,
    ghosts: HashSet<RevisionId>,
    parent_cache: HashMap<RevisionId, Vec<RevisionId>>,
    started: bool,
}

impl<P: ParentsProvider> BreadthFirstSearcher<P> {
    pub fn new(parents: Arc<P>, seeds: impl IntoIterator<Item = RevisionId>) -> Self {
        let seeds: HashSet<RevisionId> = seeds.into_iter().collect();
        BreadthFirstSearcher {
            parents,
            seen: seeds.clone(),
            frontier: seeds,
            stopped: HashSet::new(),
            ghosts: HashSet::new(),
            parent_cache: HashMap::new(),
            started: false,
        }
    }

    /// All revisions this searcher has encountered so far, including the
    /// seeds and anything discovered by a prior [`step`](Self::step).
    pub fn seen(&self) -> &HashSet<RevisionId> {
        &self.seen
    }

    pub fn is_ghost(&self, rev: &RevisionId) -> bool {
        self.ghosts.contains(rev)
    }

    pub fn cached_parents(&self, rev: &RevisionId) -> Option<&Vec<RevisionId>> {
        self.parent_cache.get(rev)
    }

    /// True once the frontier is empty and a further [`step`](Self::step)
    /// would be a no-op.
    pub fn is_exhausted(&self) -> bool {
        self.started && self.frontier.is_empty()
    }

    /// Expands one layer: queries parents of the current frontier,
    /// records what was found, and advances the frontier to the newly
    /// discovered (non-ghost, non-stopped) revisions. Revisions in the
    /// query batch that are absent from the parent map are ghosts; they
    /// are folded into `stopped` so a later backfill can't retroactively
    /// change an already-computed answer.
    pub fn step(&mut self) -> Result<StepResult> {
        self.started = true;
        let query: Vec<RevisionId> = self
            .frontier
            .iter()
            .filter(|k| !self.stopped.contains(*k))
            .cloned()
            .collect();
        self.frontier.clear();
        if query.is_empty() {
            return Ok(StepResult::default());
        }
        let parent_map = self.parents.parents_of(&query)?;
        let mut new_present = HashSet::new();
        let mut new_ghosts = HashSet::new();
        let mut next_frontier = HashSet::new();
        for key in &query {
            match parent_map.get(key) {
                Some(parents) => {
                    new_present.insert(key.clone());
                    self.parent_cache.insert(key.clone(), parents.clone());
                    for p in parents {
                        if p.is_null() || self.stopped.contains(p) {
                            continue;
                        }
                        if self.seen.insert(p.clone()) {
                            next_frontier.insert(p.clone());
                        }
                    }
                }
                None => {
                    new_ghosts.insert(key.clone());
                    self.ghosts.insert(key.clone());
                    self.stopped.insert(key.clone());
                }
            }
        }
        self.frontier = next_frontier;
        tracing::trace!(
            present = new_present.len(),
            ghosts = new_ghosts.len(),
            "searcher step"
        );
        Ok(StepResult {
            new_present,
            new_ghosts,
        })
    }

    /// Runs [`step`](Self::step) until the frontier is exhausted,
    /// returning the full seen set. Equivalent to draining the iterator
    /// protocol the Python searcher exposes via `StopIteration`.
    pub fn drain(&mut self) -> Result<()> {
        loop {
            let result = self.step()?;
            if result.is_empty() && self.is_exhausted() {
                break;
            }
        }
        Ok(())
    }

    /// Prevents `revs` from being re-queued even if reached via another
    /// path. Does not retroactively remove already-seen ancestors of
    /// `revs`; callers that need those must walk them explicitly with
    /// [`find_seen_ancestors`](Self::find_seen_ancestors).
    pub fn stop_searching_any(&mut self, revs: impl IntoIterator<Item = RevisionId>) {
        for r in revs {
            self.frontier.remove(&r);
            self.stopped.insert(r);
        }
    }

    /// Re-injects `revs` into the frontier, un-stopping them if they had
    /// previously been excluded.
    pub fn start_searching(&mut self, revs: impl IntoIterator<Item = RevisionId>) {
        for r in revs {
            self.stopped.remove(&r);
            self.seen.insert(r.clone());
            self.frontier.insert(r);
        }
    }

    /// Walks only within the already-seen set to collect the transitive
    /// closure of ancestors below `starts` — no new parent queries are
    /// issued, so this only sees what earlier [`step`](Self::step) calls
    /// already cached.
    pub fn find_seen_ancestors(&self, starts: impl IntoIterator<Item = RevisionId>) -> HashSet<RevisionId> {
        let mut result = HashSet::new();
        let mut stack: Vec<RevisionId> = starts
            .into_iter()
            .filter(|r| self.seen.contains(r))
            .collect();
        while let Some(r) = stack.pop() {
            if !result.insert(r.clone()) {
                continue;
            }
            if let Some(parents) = self.parent_cache.get(&r) {
                for p in parents {
                    if self.seen.contains(p) && !result.contains(p) {
                        stack.push(p.clone());
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parents::HashMapParentsProvider;
    use std::collections::HashMap;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn linear_provider() -> Arc<HashMapParentsProvider> {
        let mut map = HashMap::new();
        map.insert(rid("a"), vec![]);
        map.insert(rid("b"), vec![rid("a")]);
        map.insert(rid("c"), vec![rid("b")]);
        Arc::new(HashMapParentsProvider::new(map))
    }

    #[test]
    fn drains_a_linear_chain() {
        let mut searcher = BreadthFirstSearcher::new(linear_provider(), vec![rid("c")]);
        searcher.drain().unwrap();
        assert_eq!(
            searcher.seen().clone(),
            [rid("a"), rid("b"), rid("c")].into_iter().collect()
        );
    }

    #[test]
    fn ghost_parent_is_reported_and_stops_expansion() {
        let mut map = HashMap::new();
        map.insert(rid("b"), vec![rid("ghost")]);
        let provider = Arc::new(HashMapParentsProvider::new(map));
        let mut searcher = BreadthFirstSearcher::new(provider, vec![rid("b")]);
        let step1 = searcher.step().unwrap();
        assert!(step1.new_present.contains(&rid("b")));
        let step2 = searcher.step().unwrap();
        assert!(step2.new_ghosts.contains(&rid("ghost")));
        assert!(searcher.is_ghost(&rid("ghost")));
        let step3 = searcher.step().unwrap();
        assert!(step3.is_empty());
    }

    #[test]
    fn find_seen_ancestors_walks_cached_parents_only() {
        let mut searcher = BreadthFirstSearcher::new(linear_provider(), vec![rid("c")]);
        searcher.drain().unwrap();
        let ancestors = searcher.find_seen_ancestors(vec![rid("c")]);
        assert_eq!(
            ancestors,
            [rid("a"), rid("b"), rid("c")].into_iter().collect()
        );
    }

    #[test]
    fn stop_searching_any_prevents_requeue() {
        let mut searcher = BreadthFirstSearcher::new(linear_provider(), vec![rid("c")]);
        searcher.step().unwrap(); // discovers b
        searcher.stop_searching_any(vec![rid("b")]);
        let step = searcher.step().unwrap();
        assert!(step.is_empty());
    }
}
