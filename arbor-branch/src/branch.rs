//! `Branch`: an ordered mainline of revision-ids plus the handful of
//! bookmarks (`parent`, `push_location`, tags) `bzrlib.branch.Branch`
//! exposes, persisted through a [`Transport`] using the control-file
//! layout spec.md §6 names (`revision-history`, `parent`,
//! `pending-merges`/tags are not wire-specified so this workspace picks
//! its own file name, documented in DESIGN.md).
//!
//! A `Branch` never owns a `Repository`: operations that need revision
//! content (fetch during `pull`, merge-depth bookkeeping) take one as a
//! borrowed argument, following the "short-lived views over one owner"
//! shape spec.md §9's design notes recommend for the
//! Branch/Repository/ControlDir cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_errors::{Error, Result};
use arbor_graph::{merge_sort, HashMapParentsProvider, MergeSortedRevision};
use arbor_model::RevisionId;
use arbor_repo::Repository;
use arbor_transport::Transport;

const REVISION_HISTORY_FILE: &str = "revision-history";
const PARENT_FILE: &str = "parent";
const PUSH_LOCATION_FILE: &str = "push_location";
const PULL_LOCATION_FILE: &str = "pull";
const X_PULL_LOCATION_FILE: &str = "x-pull";
const TAGS_FILE: &str = "tags";

/// The ordered mainline history of one branch, and the handful of
/// location bookmarks that travel with it.
pub struct Branch {
    transport: Box<dyn Transport>,
    history: Vec<RevisionId>,
    tags: BTreeMap<String, RevisionId>,
}

impl Branch {
    /// Creates a fresh, empty branch at `transport`'s root.
    pub fn create(transport: Box<dyn Transport>) -> Result<Self> {
        let mut branch = Branch {
            transport,
            history: Vec::new(),
            tags: BTreeMap::new(),
        };
        branch.persist_history()?;
        Ok(branch)
    }

    /// Opens an existing branch, reading its persisted mainline and tags.
    pub fn open(transport: Box<dyn Transport>) -> Result<Self> {
        let history = if transport.has(REVISION_HISTORY_FILE) {
            let bytes = transport.get(REVISION_HISTORY_FILE)?;
            parse_history(&bytes)?
        } else {
            Vec::new()
        };
        let tags = if transport.has(TAGS_FILE) {
            let bytes = transport.get(TAGS_FILE)?;
            parse_tags(&bytes)?
        } else {
            BTreeMap::new()
        };
        Ok(Branch {
            transport,
            history,
            tags,
        })
    }

    pub fn revision_history(&self) -> &[RevisionId] {
        &self.history
    }

    /// `(revno, rev_id)` of the tip: revno 0 / `NULL_REVISION` for an
    /// empty branch.
    pub fn last_revision_info(&self) -> (i64, RevisionId) {
        match self.history.last() {
            Some(tip) => (self.history.len() as i64, tip.clone()),
            None => (0, RevisionId::null()),
        }
    }

    pub fn append_revision(&mut self, id: RevisionId) -> Result<()> {
        self.history.push(id);
        self.persist_history()
    }

    pub fn set_revision_history(&mut self, history: Vec<RevisionId>) -> Result<()> {
        self.history = history;
        self.persist_history()
    }

    fn persist_history(&self) -> Result<()> {
        let mut buf = String::new();
        for id in &self.history {
            buf.push_str(id.as_str());
            buf.push('\n');
        }
        self.transport.put(REVISION_HISTORY_FILE, buf.as_bytes())
    }

    pub fn get_parent(&self) -> Option<String> {
        self.read_location(PARENT_FILE)
    }

    pub fn set_parent(&mut self, location: Option<&str>) -> Result<()> {
        match location {
            Some(loc) => self.transport.put(PARENT_FILE, loc.as_bytes()),
            None => {
                if self.transport.has(PARENT_FILE) {
                    self.transport.delete(PARENT_FILE)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Open Question 3: new writes only ever touch `push_location`, but
    /// reads still fall through the legacy `parent`/`pull`/`x-pull`
    /// filenames in that order so a branch written by an older version
    /// of this engine keeps resolving to the location it actually has.
    pub fn get_push_location(&self) -> Option<String> {
        self.read_location(PUSH_LOCATION_FILE)
            .or_else(|| self.read_location(PARENT_FILE))
            .or_else(|| self.read_location(PULL_LOCATION_FILE))
            .or_else(|| self.read_location(X_PULL_LOCATION_FILE))
    }

    pub fn set_push_location(&mut self, location: &str) -> Result<()> {
        self.transport.put(PUSH_LOCATION_FILE, location.as_bytes())
    }

    fn read_location(&self, file: &str) -> Option<String> {
        if !self.transport.has(file) {
            return None;
        }
        let bytes = self.transport.get(file).ok()?;
        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim_end_matches('\n');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn tags(&self) -> &BTreeMap<String, RevisionId> {
        &self.tags
    }

    pub fn set_tag(&mut self, name: impl Into<String>, target: RevisionId) -> Result<()> {
        self.tags.insert(name.into(), target);
        self.persist_tags()
    }

    fn persist_tags(&self) -> Result<()> {
        let mut buf = String::new();
        for (name, id) in &self.tags {
            buf.push_str(name);
            buf.push('\t');
            buf.push_str(id.as_str());
            buf.push('\n');
        }
        self.transport.put(TAGS_FILE, buf.as_bytes())
    }

    pub fn revision_id_to_revno(&self, id: &RevisionId) -> Result<i64> {
        if id.is_null() {
            return Ok(0);
        }
        self.history
            .iter()
            .position(|r| r == id)
            .map(|pos| (pos + 1) as i64)
            .ok_or_else(|| Error::NoSuchRevision(id.to_string()))
    }

    pub fn get_rev_id(&self, revno: i64) -> Result<RevisionId> {
        if revno == 0 {
            return Ok(RevisionId::null());
        }
        if revno < 0 || revno as usize > self.history.len() {
            return Err(Error::InvalidRevisionNumber(revno));
        }
        Ok(self.history[(revno - 1) as usize].clone())
    }

    /// The revisions `other` has beyond the point `self` and `other`
    /// share a common mainline prefix, up to and including `stop`
    /// (defaulting to `other`'s tip). Open Question 2: `stop` is always
    /// a revision-id, never a revno — the type system enforces this by
    /// construction rather than needing a runtime check.
    pub fn missing_revisions(&self, other: &Branch, stop: Option<&RevisionId>) -> Result<Vec<RevisionId>> {
        let common_len = common_prefix_len(&self.history, &other.history);
        let diverged = common_len < self.history.len()
            && common_len < other.history.len()
            && self.history[common_len] != other.history[common_len];
        if diverged {
            return Err(Error::DivergedBranches);
        }
        // `self` strictly ahead of `other` (`other`'s history is a prefix
        // of `self`'s): nothing to pull, not a divergence.
        if common_len >= other.history.len() {
            return Ok(Vec::new());
        }
        let stop_index = match stop {
            None => other.history.len(),
            Some(id) => match other.history.iter().position(|r| r == id) {
                Some(pos) => pos + 1,
                None => return Err(Error::NoSuchRevision(id.to_string())),
            },
        };
        if stop_index < common_len {
            return Ok(Vec::new());
        }
        Ok(other.history[common_len..stop_index].to_vec())
    }

    /// Advances `self`'s mainline to include `other`'s history up to
    /// `stop_revision`, without touching repository content. `pull`
    /// layers a repository fetch on top of this.
    pub fn update_revisions(&mut self, other: &Branch, stop_revision: Option<&RevisionId>) -> Result<()> {
        let missing = self.missing_revisions(other, stop_revision)?;
        if missing.is_empty() {
            return Ok(());
        }
        let mut history = self.history.clone();
        history.extend(missing);
        self.set_revision_history(history)
    }

    /// spec.md §4.5 pull semantics: fetch first, then either fast-forward
    /// (common-prefix case) or, with `overwrite`, replace `self`'s
    /// history outright. Diverged histories without `overwrite` are
    /// rejected and `self` is left untouched.
    pub fn pull(
        &mut self,
        source: &Branch,
        target_repo: &mut Repository,
        source_repo: &Repository,
        overwrite: bool,
    ) -> Result<()> {
        let (_, source_tip) = source.last_revision_info();
        target_repo.fetch(source_repo, Some(source_tip), true, None)?;

        let common_len = common_prefix_len(&self.history, &source.history);
        let diverged = common_len < self.history.len()
            && common_len < source.history.len()
            && self.history[common_len] != source.history[common_len];

        if diverged && !overwrite {
            return Err(Error::DivergedBranches);
        }
        if overwrite {
            return self.set_revision_history(source.history.clone());
        }
        self.update_revisions(source, source.history.last())
    }

    /// Newest-to-oldest merge-sorted ancestry of the tip, with
    /// merge-depth bookkeeping, the traversal `iter_merge_sorted_revisions`
    /// and the log pipeline both build on.
    pub fn iter_merge_sorted_revisions(&self, repo: &Repository) -> Result<Vec<MergeSortedRevision>> {
        let (_, tip) = self.last_revision_info();
        if tip.is_null() {
            return Ok(Vec::new());
        }
        let provider = Arc::new(repository_parents(repo)?);
        merge_sort(&provider, &tip)
    }
}

fn repository_parents(repo: &Repository) -> Result<HashMapParentsProvider> {
    let mut map = std::collections::HashMap::with_capacity(repo.all_revision_ids().len());
    for id in repo.all_revision_ids() {
        map.insert(id.clone(), repo.get_revision(id)?.parent_ids);
    }
    Ok(HashMapParentsProvider::new(map))
}

fn common_prefix_len(a: &[RevisionId], b: &[RevisionId]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn parse_history(bytes: &[u8]) -> Result<Vec<RevisionId>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Bug("revision-history is not valid utf-8".to_string()))?;
    text.lines().map(RevisionId::new).collect()
}

fn parse_tags(bytes: &[u8]) -> Result<BTreeMap<String, RevisionId>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Bug("tags file is not valid utf-8".to_string()))?;
    let mut out = BTreeMap::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (name, id) = line
            .split_once('\t')
            .ok_or_else(|| Error::Bug(format!("malformed tags line {line:?}")))?;
        out.insert(name.to_string(), RevisionId::new(id)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_repo::{Knit1Format, Repository};
    use arbor_transport::LocalTransport;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn branch_at(dir: &std::path::Path) -> Branch {
        std::fs::create_dir_all(dir).unwrap();
        Branch::create(Box::new(LocalTransport::new(dir))).unwrap()
    }

    #[test]
    fn append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut branch = branch_at(dir.path());
        branch.append_revision(rid("r1")).unwrap();
        branch.append_revision(rid("r2")).unwrap();

        let reopened = Branch::open(Box::new(LocalTransport::new(dir.path()))).unwrap();
        assert_eq!(reopened.revision_history(), &[rid("r1"), rid("r2")]);
    }

    #[test]
    fn push_location_falls_through_legacy_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut branch = branch_at(dir.path());
        assert_eq!(branch.get_push_location(), None);
        branch.set_parent(Some("bzr+ssh://example/old-parent")).unwrap();
        assert_eq!(
            branch.get_push_location().as_deref(),
            Some("bzr+ssh://example/old-parent")
        );
        branch.set_push_location("bzr+ssh://example/new").unwrap();
        assert_eq!(branch.get_push_location().as_deref(), Some("bzr+ssh://example/new"));
    }

    #[test]
    fn missing_revisions_on_shared_prefix() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = branch_at(dir_a.path());
        let mut b = branch_at(dir_b.path());
        b.set_revision_history(vec![rid("r1"), rid("r2"), rid("r3")]).unwrap();

        let missing = a.missing_revisions(&b, None).unwrap();
        assert_eq!(missing, vec![rid("r1"), rid("r2"), rid("r3")]);
    }

    #[test]
    fn missing_revisions_is_empty_when_self_is_ahead() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut a = branch_at(dir_a.path());
        let mut b = branch_at(dir_b.path());
        a.set_revision_history(vec![rid("r1"), rid("r2")]).unwrap();
        b.set_revision_history(vec![rid("r1")]).unwrap();

        assert_eq!(a.missing_revisions(&b, None).unwrap(), Vec::new());
    }

    #[test]
    fn missing_revisions_errors_on_divergence() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut a = branch_at(dir_a.path());
        let mut b = branch_at(dir_b.path());
        a.set_revision_history(vec![rid("r1"), rid("r2a")]).unwrap();
        b.set_revision_history(vec![rid("r1"), rid("r2b")]).unwrap();

        assert!(matches!(a.missing_revisions(&b, None), Err(Error::DivergedBranches)));
    }

    #[test]
    fn pull_linear_fast_forwards() {
        let dir_src = tempfile::tempdir().unwrap();
        let dir_tgt = tempfile::tempdir().unwrap();
        let mut source = branch_at(dir_src.path());
        let mut target = branch_at(dir_tgt.path());

        let mut source_repo = Repository::new(Box::new(Knit1Format));
        let mut target_repo = Repository::new(Box::new(Knit1Format));

        commit_simple(&mut source_repo, "r1", vec![]);
        source.append_revision(rid("r1")).unwrap();
        commit_simple(&mut source_repo, "r2", vec![rid("r1")]);
        source.append_revision(rid("r2")).unwrap();

        target.pull(&source, &mut target_repo, &source_repo, false).unwrap();
        assert_eq!(target.revision_history(), &[rid("r1"), rid("r2")]);
        assert!(target_repo.has_revision(&rid("r2")));
    }

    #[test]
    fn pull_diverged_without_overwrite_errors_and_leaves_history() {
        let dir_src = tempfile::tempdir().unwrap();
        let dir_tgt = tempfile::tempdir().unwrap();
        let mut source = branch_at(dir_src.path());
        let mut target = branch_at(dir_tgt.path());
        let mut source_repo = Repository::new(Box::new(Knit1Format));
        let mut target_repo = Repository::new(Box::new(Knit1Format));

        commit_simple(&mut source_repo, "r1", vec![]);
        commit_simple(&mut target_repo, "r1", vec![]);
        commit_simple(&mut source_repo, "r2a", vec![rid("r1")]);
        commit_simple(&mut target_repo, "r2b", vec![rid("r1")]);
        source.set_revision_history(vec![rid("r1"), rid("r2a")]).unwrap();
        target.set_revision_history(vec![rid("r1"), rid("r2b")]).unwrap();

        let err = target.pull(&source, &mut target_repo, &source_repo, false);
        assert!(matches!(err, Err(Error::DivergedBranches)));
        assert_eq!(target.revision_history(), &[rid("r1"), rid("r2b")]);
    }

    #[test]
    fn pull_diverged_with_overwrite_replaces_history() {
        let dir_src = tempfile::tempdir().unwrap();
        let dir_tgt = tempfile::tempdir().unwrap();
        let mut source = branch_at(dir_src.path());
        let mut target = branch_at(dir_tgt.path());
        let mut source_repo = Repository::new(Box::new(Knit1Format));
        let mut target_repo = Repository::new(Box::new(Knit1Format));

        commit_simple(&mut source_repo, "r1", vec![]);
        commit_simple(&mut target_repo, "r1", vec![]);
        commit_simple(&mut source_repo, "r2a", vec![rid("r1")]);
        commit_simple(&mut target_repo, "r2b", vec![rid("r1")]);
        source.set_revision_history(vec![rid("r1"), rid("r2a")]).unwrap();
        target.set_revision_history(vec![rid("r1"), rid("r2b")]).unwrap();

        target.pull(&source, &mut target_repo, &source_repo, true).unwrap();
        assert_eq!(target.revision_history(), &[rid("r1"), rid("r2a")]);
    }

    fn commit_simple(repo: &mut Repository, id: &str, parents: Vec<RevisionId>) {
        use arbor_model::{FileId, Inventory};
        let root = FileId::new("root").unwrap();
        let inv = Inventory::empty_tree(root);
        let canonical = inv.to_canonical_bytes();
        let sha1 = {
            use sha1::{Digest, Sha1};
            let mut hasher = Sha1::new();
            hasher.update(&canonical);
            hex::encode(hasher.finalize())
        };
        let mut rev = arbor_model::Revision::new(rid(id), sha1);
        rev.parent_ids = parents;
        repo.add_revision(rev, inv, vec![]).unwrap();
    }
}
