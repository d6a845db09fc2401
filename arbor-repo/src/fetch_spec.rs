//! What to transfer in a fetch: spec.md §4.4 step 1's three-way
//! precedence, carried as a small enum rather than collapsed into one
//! code path (`bzrlib.fetch.FetchSpecFactory`/`graph.SearchResult`'s
//! `EverythingNotInOther`/`NotInOtherForRevs`/`PendingAncestryResult`
//! split plays the same role in the original).

use arbor_model::RevisionId;
use arbor_store::RecordKey;

/// Determines the set of revisions `Repository::fetch` transfers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchSpec {
    /// Every revision reachable from the source's tips.
    Everything,
    /// Ancestors of `heads` not already present in the target
    /// (`last_revision` given explicitly, spec.md §4.4 step 1c), or an
    /// empty transfer when `heads` is exactly `[NULL_REVISION]`
    /// (step 1b).
    NotInOther { heads: Vec<RevisionId> },
    /// A concrete, already-resolved key set — the fast path for a
    /// caller that already ran its own search (step 1a).
    Explicit { keys: Vec<RecordKey> },
}

impl FetchSpec {
    pub fn is_empty_null_fetch(&self) -> bool {
        matches!(self, FetchSpec::NotInOther { heads } if heads.len() == 1 && heads[0].is_null())
    }
}
