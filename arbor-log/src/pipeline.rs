//! `generate_log`: the adapter pipeline spec.md §4.8 describes, applied
//! eagerly rather than lazily (an in-memory repository has no streaming
//! I/O to amortize a lazy pipeline against — the batching step bzrlib's
//! version performs purely for throughput is therefore collapsed here).

use std::collections::HashMap;

use arbor_errors::{Error, Result};
use arbor_graph::MergeSortedRevision;
use arbor_model::{FileId, Revision, RevisionId};
use arbor_repo::Repository;
use regex::RegexBuilder;

use crate::delta::{compute_delta, Delta};
use crate::diff::{diff_lines, FileDiff};
use crate::request::{DeltaType, Direction, DiffType, LogRequest};
use arbor_branch::Branch;

/// One emitted log row: `((rev_id, revno, merge_depth), revision,
/// delta)` from spec.md §4.8's algorithm description, plus the optional
/// diff and tag decorations later pipeline stages attach.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub revision_id: RevisionId,
    pub revno: Vec<u32>,
    pub merge_depth: u32,
    pub revision: Revision,
    pub tags: Vec<String>,
    pub delta: Option<Delta>,
    pub diff: Option<Vec<FileDiff>>,
}

pub fn generate_log(repo: &Repository, branch: &Branch, request: &LogRequest) -> Result<Vec<LogEntry>> {
    let candidates = candidate_revisions(repo, branch, request)?;
    let rebased = rebase_depths(candidates);

    let levels_filtered: Vec<_> = if request.levels == 0 {
        rebased
    } else {
        rebased
            .into_iter()
            .filter(|(_, depth)| *depth < request.levels)
            .collect()
    };

    let message_re = request
        .message_search
        .as_deref()
        .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
        .transpose()
        .map_err(|e| Error::Bug(format!("invalid message_search pattern: {e}")))?;

    let tags_by_revision = reverse_tags(branch);

    let mut entries = Vec::new();
    for (sorted_rev, merge_depth) in levels_filtered {
        let revision = repo.get_revision(&sorted_rev.revision_id)?;

        if let Some(re) = &message_re {
            if !re.is_match(&revision.message) {
                continue;
            }
        }

        let current_inv = repo.get_inventory(&sorted_rev.revision_id)?;
        let primary_parent = revision.parent_ids.iter().find(|p| !p.is_null()).cloned();
        let parent_inv = match &primary_parent {
            Some(p) => Some(repo.get_inventory(p)?),
            None => None,
        };
        let full_delta = compute_delta(&current_inv, parent_inv.as_ref());

        if !request.specific_fileids.is_empty() && !touches_any(&full_delta, &request.specific_fileids) {
            continue;
        }

        let delta = match request.delta_type {
            DeltaType::None => None,
            DeltaType::Full => Some(full_delta.clone()),
            DeltaType::Partial => Some(if request.specific_fileids.is_empty() {
                full_delta.clone()
            } else {
                full_delta.restricted_to(&request.specific_fileids)
            }),
        };

        let diff = match request.diff_type {
            DiffType::None => None,
            DiffType::Full => Some(build_diffs(repo, &full_delta, &sorted_rev.revision_id, primary_parent.as_ref())?),
            DiffType::Partial => {
                let restricted = if request.specific_fileids.is_empty() {
                    full_delta.clone()
                } else {
                    full_delta.restricted_to(&request.specific_fileids)
                };
                Some(build_diffs(repo, &restricted, &sorted_rev.revision_id, primary_parent.as_ref())?)
            }
        };

        let tags = if request.generate_tags {
            tags_by_revision.get(&sorted_rev.revision_id).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        entries.push(LogEntry {
            revision_id: sorted_rev.revision_id,
            revno: sorted_rev.revno,
            merge_depth,
            revision,
            tags,
            delta,
            diff,
        });
    }

    if request.direction == Direction::Forward {
        entries.reverse();
    }

    if let Some(limit) = request.limit {
        entries.truncate(limit);
    }

    Ok(entries)
}

/// Step 1: the merge-sorted ancestry of the branch tip, newest to
/// oldest, restricted to the inclusive mainline range
/// `start_revision..end_revision`. A nested merge entry inherits the
/// range membership of the mainline revision that most recently
/// preceded it in the merge-sorted order — the mainline commit that
/// actually brought it in.
fn candidate_revisions(
    repo: &Repository,
    branch: &Branch,
    request: &LogRequest,
) -> Result<Vec<MergeSortedRevision>> {
    let sorted = branch.iter_merge_sorted_revisions(repo)?;

    let start_revno = match &request.start_revision {
        Some(id) => branch.revision_id_to_revno(id)?,
        None => 1,
    };
    let end_revno = match &request.end_revision {
        Some(id) => branch.revision_id_to_revno(id)?,
        None => branch.last_revision_info().0,
    };

    let mut out = Vec::new();
    let mut governing_revno = end_revno;
    for rec in sorted {
        if rec.merge_depth == 0 {
            governing_revno = branch.revision_id_to_revno(&rec.revision_id)?;
        }
        if governing_revno >= start_revno && governing_revno <= end_revno {
            out.push(rec);
        }
    }
    Ok(out)
}

/// Step 2: rebase merge depths so the shallowest surviving revision is
/// at depth 0, preserving relative depth between the rest.
fn rebase_depths(candidates: Vec<MergeSortedRevision>) -> Vec<(MergeSortedRevision, u32)> {
    let min_depth = candidates.iter().map(|r| r.merge_depth).min().unwrap_or(0);
    candidates
        .into_iter()
        .map(|r| {
            let depth = r.merge_depth - min_depth;
            (r, depth)
        })
        .collect()
}

fn touches_any(delta: &Delta, file_ids: &[FileId]) -> bool {
    file_ids.iter().any(|id| delta.touches(id))
}

fn build_diffs(
    repo: &Repository,
    delta: &Delta,
    revision_id: &RevisionId,
    parent_id: Option<&RevisionId>,
) -> Result<Vec<FileDiff>> {
    let mut out = Vec::with_capacity(delta.entries.len());
    for entry in &delta.entries {
        let after = match repo.get_text(&entry.file_id, revision_id) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let before = match parent_id {
            Some(p) => repo.get_text(&entry.file_id, p).ok(),
            None => None,
        };
        out.push(FileDiff {
            file_id: entry.file_id.clone(),
            path: entry.path.clone(),
            lines: diff_lines(before.as_deref(), &after),
        });
    }
    Ok(out)
}

fn reverse_tags(branch: &Branch) -> HashMap<RevisionId, Vec<String>> {
    let mut out: HashMap<RevisionId, Vec<String>> = HashMap::new();
    for (name, target) in branch.tags() {
        out.entry(target.clone()).or_default().push(name.clone());
    }
    out
}
