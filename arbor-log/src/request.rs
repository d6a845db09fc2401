//! The `LogRequest` configuration (spec.md §4.8) and its small option
//! enums.

use arbor_model::{FileId, RevisionId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Reverse,
    Forward,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Reverse
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeltaType {
    None,
    Partial,
    Full,
}

impl Default for DeltaType {
    fn default() -> Self {
        DeltaType::None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiffType {
    None,
    Partial,
    Full,
}

impl Default for DiffType {
    fn default() -> Self {
        DiffType::None
    }
}

/// One log query. Every field corresponds to a row of spec.md §4.8's
/// option table; `match_using_deltas` is the `_match_using_deltas`
/// internal toggle exposed here rather than hidden, since whether the
/// per-file-id filter consults deltas or the per-file graph is
/// observable through which revisions satisfy `specific_fileids` when a
/// merge both adds and later deletes the same path.
#[derive(Clone, Debug, Default)]
pub struct LogRequest {
    pub direction: Direction,
    pub specific_fileids: Vec<FileId>,
    pub start_revision: Option<RevisionId>,
    pub end_revision: Option<RevisionId>,
    pub limit: Option<usize>,
    pub message_search: Option<String>,
    /// 0 = all merge depths, 1 = mainline only, n = up to depth n.
    pub levels: u32,
    pub generate_tags: bool,
    pub delta_type: DeltaType,
    pub diff_type: DiffType,
    pub match_using_deltas: bool,
}
