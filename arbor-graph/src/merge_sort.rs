//! Merge-depth bookkeeping shared by `Branch::iter_merge_sorted_revisions`
//! (spec.md §4.5) and the log pipeline (spec.md §4.8): ordering revisions
//! the way they were merged into a tip, and computing a revno from a
//! handful of known anchors without walking all of history.
//!
//! Grounded on `bzrlib/graph.py`'s `Graph.find_merge_order` and
//! `Graph.find_distance_to_null`; `merge_sort` itself corresponds to
//! `bzrlib/tsort.py`'s `merge_sort`, reimplemented here with a
//! simplified two-level revno (`[mainline_seq]` or `[branch_id,
//! branch_seq]`) rather than the original's fully dotted
//! `mainline.branch.sub-branch` numbering — `arbor-log` only consumes
//! `merge_depth` for its `levels` filter, so the exact revno string
//! format is not load-bearing here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_errors::{Error, Result};
use arbor_model::RevisionId;

use crate::parents::ParentsProvider;
use crate::searcher::BreadthFirstSearcher;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSortedRevision {
    pub revision_id: RevisionId,
    pub merge_depth: u32,
    pub revno: Vec<u32>,
    /// True for the oldest revision of a merged-in branch: the point
    /// where that branch rejoins its parent line.
    pub end_of_merge: bool,
}

/// Orders the ancestry of `tip` newest-to-oldest along the mainline,
/// with each merged-in branch emitted depth-first immediately after the
/// merge commit that brought it in — the traversal `bzrlib.log` relies
/// on to group a merge's contents together.
pub fn merge_sort<P: ParentsProvider>(
    parents_provider: &Arc<P>,
    tip: &RevisionId,
) -> Result<Vec<MergeSortedRevision>> {
    let mut searcher = BreadthFirstSearcher::new(parents_provider.clone(), vec![tip.clone()]);
    searcher.drain()?;
    let seen: Vec<RevisionId> = searcher.seen().iter().cloned().collect();
    let parent_map = parents_provider.parents_of(&seen)?;

    let mut out = Vec::new();
    let mut visited: HashSet<RevisionId> = HashSet::new();
    walk_mainline(tip, 0, &parent_map, &mut visited, &mut out, &[]);
    Ok(out)
}

fn walk_mainline(
    start: &RevisionId,
    depth: u32,
    parent_map: &HashMap<RevisionId, Vec<RevisionId>>,
    visited: &mut HashSet<RevisionId>,
    out: &mut Vec<MergeSortedRevision>,
    branch_prefix: &[u32],
) {
    let mut chain_indices = Vec::new();
    let mut cur = start.clone();
    loop {
        if visited.contains(&cur) {
            break;
        }
        visited.insert(cur.clone());
        out.push(MergeSortedRevision {
            revision_id: cur.clone(),
            merge_depth: depth,
            revno: Vec::new(),
            end_of_merge: false,
        });
        chain_indices.push(out.len() - 1);

        let parents = parent_map.get(&cur).cloned().unwrap_or_default();
        let mut next_branch = 1u32;
        for extra_parent in parents.iter().skip(1) {
            if extra_parent.is_null() || visited.contains(extra_parent) {
                continue;
            }
            let mut child_prefix = branch_prefix.to_vec();
            child_prefix.push(next_branch);
            walk_mainline(extra_parent, depth + 1, parent_map, visited, out, &child_prefix);
            next_branch += 1;
        }

        match parents.first() {
            Some(p) if !p.is_null() => cur = p.clone(),
            _ => break,
        }
    }

    let len = chain_indices.len() as u32;
    for (i, &idx) in chain_indices.iter().enumerate() {
        let seq = len - i as u32;
        let mut revno = branch_prefix.to_vec();
        revno.push(seq);
        out[idx].revno = revno;
        if depth > 0 && i == chain_indices.len() - 1 {
            out[idx].end_of_merge = true;
        }
    }
}

/// The order in which each of `lca_ids` was merged into `tip`: walks
/// backwards left-first with an explicit stack, stopping as soon as
/// every lowest-common-ancestor has been located.
pub fn find_merge_order<P: ParentsProvider>(
    parents_provider: &P,
    tip: &RevisionId,
    lca_ids: &[RevisionId],
) -> Result<Vec<RevisionId>> {
    if lca_ids.len() == 1 {
        return Ok(lca_ids.to_vec());
    }
    let mut looking_for: HashSet<RevisionId> = lca_ids.iter().cloned().collect();
    let mut stack = vec![tip.clone()];
    let mut found = Vec::new();
    let mut stop: HashSet<RevisionId> = HashSet::new();

    while let Some(next) = stack.pop() {
        if looking_for.is_empty() {
            break;
        }
        stop.insert(next.clone());
        if looking_for.remove(&next) {
            found.push(next.clone());
            if looking_for.len() == 1 {
                found.push(looking_for.iter().next().cloned().unwrap());
                break;
            }
            continue;
        }
        let parent_map = parents_provider.parents_of(&[next.clone()])?;
        let parents = match parent_map.get(&next) {
            Some(p) if !p.is_empty() => p.clone(),
            _ => continue,
        };
        for parent_id in parents.into_iter().rev() {
            if !stop.contains(&parent_id) {
                stack.push(parent_id.clone());
            }
            stop.insert(parent_id);
        }
    }
    Ok(found)
}

/// The left-hand distance from `target` to `NULL_REVISION` (equivalently,
/// its mainline revno), found by walking `target`'s first-parent chain
/// and a handful of already-known anchors in lockstep until they meet,
/// rather than walking all the way back to the origin every time.
pub fn find_distance_to_null<P: ParentsProvider>(
    parents_provider: &P,
    target: &RevisionId,
    known_revision_ids: &[(RevisionId, i64)],
) -> Result<i64> {
    let mut known_revnos: HashMap<RevisionId, i64> = known_revision_ids.iter().cloned().collect();
    known_revnos.insert(RevisionId::null(), 0);

    let mut cur_tip = target.clone();
    let mut num_steps: i64 = 0;
    let mut searching_known_tips: Vec<RevisionId> = known_revnos.keys().cloned().collect();
    let mut unknown_searched: HashMap<RevisionId, i64> = HashMap::new();

    while !known_revnos.contains_key(&cur_tip) {
        unknown_searched.insert(cur_tip.clone(), num_steps);
        num_steps += 1;
        let mut to_search: HashSet<RevisionId> = HashSet::new();
        to_search.insert(cur_tip.clone());
        to_search.extend(searching_known_tips.iter().cloned());
        let parent_map = parents_provider.parents_of(&to_search.into_iter().collect::<Vec<_>>())?;

        let parents = parent_map.get(&cur_tip).cloned().unwrap_or_default();
        if parents.is_empty() {
            return Err(Error::GhostUnusableHere(cur_tip.to_string()));
        }
        cur_tip = parents[0].clone();

        let mut next_known_tips = Vec::new();
        for revision_id in &searching_known_tips {
            let parents = match parent_map.get(revision_id) {
                Some(p) if !p.is_empty() => p.clone(),
                _ => continue,
            };
            let next = parents[0].clone();
            let next_revno = known_revnos[revision_id] - 1;
            if let Some(steps) = unknown_searched.get(&next) {
                return Ok(next_revno + steps);
            }
            if known_revnos.contains_key(&next) {
                continue;
            }
            known_revnos.insert(next.clone(), next_revno);
            next_known_tips.push(next);
        }
        searching_known_tips = next_known_tips;
    }
    Ok(known_revnos[&cur_tip] + num_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parents::HashMapParentsProvider;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    /// r1 - r2 - r3 -\
    ///            r2b - r4
    fn merge_graph() -> Arc<HashMapParentsProvider> {
        let mut map = HashMap::new();
        map.insert(rid("r1"), vec![]);
        map.insert(rid("r2"), vec![rid("r1")]);
        map.insert(rid("r3"), vec![rid("r2")]);
        map.insert(rid("r2b"), vec![rid("r1")]);
        map.insert(rid("r4"), vec![rid("r3"), rid("r2b")]);
        Arc::new(HashMapParentsProvider::new(map))
    }

    #[test]
    fn merge_sort_groups_merged_branch_after_merge_point() {
        let provider = merge_graph();
        let sorted = merge_sort(&provider, &rid("r4")).unwrap();
        let ids: Vec<&str> = sorted.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r3", "r2", "r2b", "r1"]);
        let depths: HashMap<&str, u32> = sorted
            .iter()
            .map(|r| (r.revision_id.as_str(), r.merge_depth))
            .collect();
        assert_eq!(depths["r4"], 0);
        assert_eq!(depths["r3"], 0);
        assert_eq!(depths["r2b"], 1);
        assert_eq!(depths["r1"], 0);
    }

    #[test]
    fn find_merge_order_single_lca_returns_as_is() {
        let provider = merge_graph();
        let order = find_merge_order(&*provider, &rid("r4"), &[rid("r1")]).unwrap();
        assert_eq!(order, vec![rid("r1")]);
    }

    #[test]
    fn find_distance_to_null_counts_mainline_length() {
        let provider = merge_graph();
        let distance = find_distance_to_null(&*provider, &rid("r3"), &[]).unwrap();
        assert_eq!(distance, 3);
    }

    #[test]
    fn find_distance_to_null_uses_known_anchor() {
        let provider = merge_graph();
        let distance =
            find_distance_to_null(&*provider, &rid("r3"), &[(rid("r1"), 1)]).unwrap();
        assert_eq!(distance, 3);
    }
}
