//! [`KnownGraph`]: a precomputed acceleration structure for when the
//! entire parent map already fits in memory. Grounded on
//! `bzrlib.graph.KnownGraph` / `_KnownGraphNode`: every node gets a
//! greatest-distance-from-origin (GDFO) via a single max-heap pass, and a
//! "linear dominator" — the nearest ancestor such that every node
//! between it and here has exactly one parent and one child — so
//! [`heads`](KnownGraph::heads) can skip straight-line runs instead of
//! visiting every intermediate revision.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use arbor_errors::{Error, Result};
use arbor_model::RevisionId;

use crate::parents::ParentsProvider;

struct Node {
    parent_keys: Option<Vec<RevisionId>>,
    child_keys: Vec<RevisionId>,
    linear_dominator: Option<RevisionId>,
    dominator_distance: u32,
    gdfo: Option<u32>,
}

pub struct KnownGraph {
    nodes: HashMap<RevisionId, Node>,
}

impl KnownGraph {
    pub fn new(parent_map: HashMap<RevisionId, Vec<RevisionId>>) -> Self {
        let mut nodes: HashMap<RevisionId, Node> = HashMap::with_capacity(parent_map.len());
        for (key, parent_keys) in &parent_map {
            nodes.entry(key.clone()).or_insert_with(|| Node {
                parent_keys: None,
                child_keys: Vec::new(),
                linear_dominator: None,
                dominator_distance: 0,
                gdfo: None,
            });
            nodes.get_mut(key).unwrap().parent_keys = Some(parent_keys.clone());
            for parent_key in parent_keys {
                nodes.entry(parent_key.clone()).or_insert_with(|| Node {
                    parent_keys: None,
                    child_keys: Vec::new(),
                    linear_dominator: None,
                    dominator_distance: 0,
                    gdfo: None,
                });
                nodes.get_mut(parent_key).unwrap().child_keys.push(key.clone());
            }
        }
        let mut graph = KnownGraph { nodes };
        graph.find_linear_dominators();
        graph.find_gdfo();
        graph
    }

    fn find_linear_dominators(&mut self) {
        let keys: Vec<RevisionId> = self.nodes.keys().cloned().collect();
        for key in keys {
            if self.nodes[&key].linear_dominator.is_some() {
                continue;
            }
            let mut stack = Vec::new();
            let mut current = key.clone();
            loop {
                let node = &self.nodes[&current];
                let parent_keys = node.parent_keys.clone();
                match parent_keys {
                    None => {
                        self.settle_own_dominator(&current);
                        break;
                    }
                    Some(pk) if pk.len() != 1 => {
                        self.settle_own_dominator(&current);
                        break;
                    }
                    Some(pk) => {
                        let parent_key = pk[0].clone();
                        if self.nodes[&parent_key].child_keys.len() > 1 {
                            self.settle_own_dominator(&current);
                            break;
                        }
                        if let Some(dom) = self.nodes[&parent_key].linear_dominator.clone() {
                            let dist = self.nodes[&parent_key].dominator_distance;
                            let n = self.nodes.get_mut(&current).unwrap();
                            n.linear_dominator = Some(dom);
                            n.dominator_distance = dist + 1;
                            break;
                        }
                        stack.push(current.clone());
                        current = parent_key;
                    }
                }
            }
            let dominator = self.nodes[&current].linear_dominator.clone().unwrap();
            let mut distance = self.nodes[&current].dominator_distance;
            while let Some(next) = stack.pop() {
                distance += 1;
                let n = self.nodes.get_mut(&next).unwrap();
                n.linear_dominator = Some(dominator.clone());
                n.dominator_distance = distance;
            }
        }
    }

    fn settle_own_dominator(&mut self, key: &RevisionId) {
        let n = self.nodes.get_mut(key).unwrap();
        n.linear_dominator = Some(key.clone());
        n.dominator_distance = 0;
    }

    fn find_gdfo(&mut self) {
        let tails: Vec<RevisionId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent_keys.as_ref().map_or(true, |p| p.is_empty()))
            .map(|(k, _)| k.clone())
            .collect();

        let mut heap: BinaryHeap<Reverse<(u32, RevisionId)>> = BinaryHeap::new();
        for key in &tails {
            self.nodes.get_mut(key).unwrap().gdfo = Some(1);
            heap.push(Reverse((1, key.clone())));
        }
        while let Some(Reverse((gdfo, key))) = heap.pop() {
            if let Some(existing) = self.nodes[&key].gdfo {
                if gdfo < existing {
                    continue;
                }
            }
            let next_gdfo = gdfo + 1;
            let child_keys = self.nodes[&key].child_keys.clone();
            for child_key in child_keys {
                let needs_update = self.nodes[&child_key]
                    .gdfo
                    .map_or(true, |g| g < next_gdfo);
                if !needs_update {
                    continue;
                }
                let parent_keys = self.nodes[&child_key]
                    .parent_keys
                    .clone()
                    .unwrap_or_default();
                let all_parents_ready = parent_keys
                    .iter()
                    .all(|pk| pk == &key || self.nodes.get(pk).map_or(false, |n| n.gdfo.is_some()));
                if all_parents_ready {
                    self.nodes.get_mut(&child_key).unwrap().gdfo = Some(next_gdfo);
                    heap.push(Reverse((next_gdfo, child_key)));
                }
            }
        }
    }

    /// The subset of `keys` that no other member dominates — same
    /// contract as [`crate::graph::Graph::heads`], computed using the
    /// precomputed GDFO/linear-dominator structure instead of fresh BFS.
    pub fn heads(&self, keys: &HashSet<RevisionId>) -> Result<HashSet<RevisionId>> {
        let mut candidates: HashSet<RevisionId> = keys.clone();
        let had_null = candidates.iter().any(|k| k.is_null());
        if had_null {
            candidates.retain(|k| !k.is_null());
            if candidates.is_empty() {
                return Ok([RevisionId::null()].into_iter().collect());
            }
        }
        if candidates.len() < 2 {
            return Ok(candidates);
        }
        for c in &candidates {
            if !self.nodes.contains_key(c) {
                return Err(Error::NoSuchRevision(c.to_string()));
            }
        }

        let mut dominator: Option<RevisionId> = None;
        let mut all_same = true;
        for c in &candidates {
            let d = self.nodes[c].linear_dominator.clone();
            match &dominator {
                None => dominator = d,
                Some(existing) => {
                    if Some(existing.clone()) != d {
                        all_same = false;
                        break;
                    }
                }
            }
        }
        if all_same {
            let head = candidates
                .iter()
                .max_by_key(|c| self.nodes[*c].dominator_distance)
                .unwrap()
                .clone();
            return Ok([head].into_iter().collect());
        }
        self.heads_from_candidates(candidates)
    }

    fn heads_from_candidates(&self, mut candidates: HashSet<RevisionId>) -> Result<HashSet<RevisionId>> {
        #[derive(Eq, PartialEq)]
        struct HeapItem(u32, RevisionId);
        impl Ord for HeapItem {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0
                    .cmp(&other.0)
                    .then_with(|| self.1.as_str().cmp(other.1.as_str()))
            }
        }
        impl PartialOrd for HeapItem {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let num_candidates = candidates.len();
        let mut ancestor_of: HashMap<RevisionId, Vec<RevisionId>> = HashMap::new();
        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::new();
        for key in &candidates {
            ancestor_of.insert(key.clone(), vec![key.clone()]);
            heap.push(HeapItem(self.nodes[key].gdfo.unwrap_or(0), key.clone()));
        }

        while let Some(HeapItem(_, key)) = heap.pop() {
            if candidates.len() <= 1 {
                break;
            }
            let this_ancestor_of = match ancestor_of.get(&key) {
                Some(v) => v.clone(),
                None => continue,
            };
            let node = match self.nodes.get(&key) {
                Some(n) => n,
                None => continue,
            };
            if this_ancestor_of.len() == num_candidates {
                if let Some(parent_keys) = &node.parent_keys {
                    for pk in parent_keys {
                        if let Some(entry) = ancestor_of.get_mut(pk) {
                            *entry = this_ancestor_of.clone();
                        }
                    }
                }
                if let Some(dom) = &node.linear_dominator {
                    if dom != &key {
                        if let Some(entry) = ancestor_of.get_mut(dom) {
                            *entry = this_ancestor_of.clone();
                        }
                    }
                }
                continue;
            }
            let parent_keys = match &node.parent_keys {
                None => continue,
                Some(pk) => pk.clone(),
            };
            let walk_keys = if node.linear_dominator.as_ref() != Some(&key) {
                vec![node.linear_dominator.clone().unwrap()]
            } else {
                parent_keys
            };
            for parent_key in walk_keys {
                if candidates.contains(&parent_key) {
                    candidates.remove(&parent_key);
                    if candidates.len() <= 1 {
                        break;
                    }
                }
                let parent_node = match self.nodes.get(&parent_key) {
                    Some(n) => n,
                    None => continue,
                };
                match ancestor_of.get(&parent_key).cloned() {
                    None => {
                        ancestor_of.insert(parent_key.clone(), this_ancestor_of.clone());
                        heap.push(HeapItem(parent_node.gdfo.unwrap_or(0), parent_key));
                    }
                    Some(existing) if existing != this_ancestor_of => {
                        let mut merged: HashSet<RevisionId> = existing.into_iter().collect();
                        merged.extend(this_ancestor_of.iter().cloned());
                        let mut merged: Vec<RevisionId> = merged.into_iter().collect();
                        merged.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                        ancestor_of.insert(parent_key, merged);
                    }
                    _ => {}
                }
            }
        }
        Ok(candidates)
    }
}

impl ParentsProvider for KnownGraph {
    fn parents_of(&self, keys: &[RevisionId]) -> Result<HashMap<RevisionId, Vec<RevisionId>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(node) = self.nodes.get(key) {
                if let Some(parents) = &node.parent_keys {
                    out.insert(key.clone(), parents.clone());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::parents::HashMapParentsProvider;
    use std::sync::Arc;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    /// Scenario C from the spec.
    fn scenario_c_map() -> HashMap<RevisionId, Vec<RevisionId>> {
        let mut map = HashMap::new();
        map.insert(rid("A"), vec![]);
        map.insert(rid("B"), vec![rid("A")]);
        map.insert(rid("C"), vec![rid("A")]);
        map.insert(rid("D"), vec![rid("B")]);
        map.insert(rid("E"), vec![rid("C")]);
        map.insert(rid("F"), vec![rid("D"), rid("E")]);
        map
    }

    #[test]
    fn gdfo_increases_with_depth() {
        let kg = KnownGraph::new(scenario_c_map());
        assert_eq!(kg.nodes[&rid("A")].gdfo, Some(1));
        assert!(kg.nodes[&rid("D")].gdfo.unwrap() > kg.nodes[&rid("A")].gdfo.unwrap());
        assert!(kg.nodes[&rid("F")].gdfo.unwrap() > kg.nodes[&rid("D")].gdfo.unwrap());
    }

    #[test]
    fn linear_chain_shares_a_dominator() {
        let mut map = HashMap::new();
        map.insert(rid("a"), vec![]);
        map.insert(rid("b"), vec![rid("a")]);
        map.insert(rid("c"), vec![rid("b")]);
        let kg = KnownGraph::new(map);
        assert_eq!(kg.nodes[&rid("c")].linear_dominator, Some(rid("a")));
        assert_eq!(kg.nodes[&rid("b")].linear_dominator, Some(rid("a")));
        assert_eq!(kg.nodes[&rid("c")].dominator_distance, 2);
    }

    #[test]
    fn branch_point_is_its_own_dominator() {
        let kg = KnownGraph::new(scenario_c_map());
        // A has two children (B, C), so B and C cannot skip past it.
        assert_eq!(kg.nodes[&rid("B")].linear_dominator, Some(rid("B")));
        assert_eq!(kg.nodes[&rid("C")].linear_dominator, Some(rid("C")));
    }

    #[test]
    fn known_graph_heads_matches_graph_heads() {
        let map = scenario_c_map();
        let kg = KnownGraph::new(map.clone());
        let g = Graph::new(Arc::new(HashMapParentsProvider::new(map)));

        let cases: Vec<HashSet<RevisionId>> = vec![
            [rid("B"), rid("C")].into_iter().collect(),
            [rid("B"), rid("F")].into_iter().collect(),
            [rid("D"), rid("E"), rid("F")].into_iter().collect(),
            [rid("A")].into_iter().collect(),
        ];
        for keys in cases {
            assert_eq!(kg.heads(&keys).unwrap(), g.heads(&keys).unwrap());
        }
    }

    #[test]
    fn known_graph_heads_null_handling_matches() {
        let kg = KnownGraph::new(scenario_c_map());
        let keys: HashSet<_> = [RevisionId::null(), rid("A")].into_iter().collect();
        assert_eq!(kg.heads(&keys).unwrap(), [rid("A")].into_iter().collect());
        let only_null: HashSet<_> = [RevisionId::null()].into_iter().collect();
        assert_eq!(kg.heads(&only_null).unwrap(), only_null);
    }
}
