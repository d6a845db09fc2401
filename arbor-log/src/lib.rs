//! The log pipeline: filtered, merge-depth-aware revision history over
//! a [`arbor_repo::Repository`]/[`arbor_branch::Branch`] pair (spec.md
//! §4.8).

pub mod delta;
pub mod diff;
pub mod formatter;
pub mod pipeline;
pub mod request;

pub use delta::{compute_delta, ChangeKind, Delta, DeltaEntry};
pub use diff::{diff_lines, DiffLine, FileDiff};
pub use formatter::{LineFormatter, LogFormatter, LongFormatter, ShortFormatter};
pub use pipeline::{generate_log, LogEntry};
pub use request::{DeltaType, Direction, DiffType, LogRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_branch::{Branch, ControlDir};
    use arbor_repo::{Knit1Format, Repository};
    use arbor_model::{EntryKind, FileId, Inventory, InventoryEntry, Revision, RevisionId};
    use arbor_transport::LocalTransport;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }
    fn fid(s: &str) -> FileId {
        FileId::new(s).unwrap()
    }

    fn sha1_hex(bytes: &[u8]) -> String {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Commits a single-file revision chained onto `parent`, returning
    /// the new inventory so the caller can chain further commits.
    fn commit(
        repo: &mut Repository,
        id: &str,
        parents: Vec<RevisionId>,
        message: &str,
        file_text: Option<&str>,
    ) {
        let root = fid("root");
        let mut inv = match parents.first() {
            Some(p) => repo.get_inventory(p).unwrap(),
            None => Inventory::empty_tree(root.clone()),
        };
        let texts = if let Some(text) = file_text {
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
            vec![(fid("f1"), text.as_bytes().to_vec())]
        } else {
            Vec::new()
        };
        let canonical = inv.to_canonical_bytes();
        let mut rev = Revision::new(rid(id), sha1_hex(&canonical));
        rev.committer = "tester".to_string();
        rev.message = message.to_string();
        rev.parent_ids = parents;
        repo.add_revision(rev, inv, texts).unwrap();
    }

    fn branch_and_repo(dir: &std::path::Path) -> (Branch, Repository) {
        let control_dir =
            ControlDir::initialize(Box::new(LocalTransport::new(dir)), Box::new(Knit1Format)).unwrap();
        (control_dir.create_branch().unwrap(), control_dir.create_repository())
    }

    #[test]
    fn reverse_direction_emits_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", Some("a"));
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "r2", vec![rid("r1")], "second", Some("ab"));
        branch.append_revision(rid("r2")).unwrap();

        let entries = generate_log(&repo, &branch, &LogRequest::default()).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[test]
    fn forward_direction_reverses_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", Some("a"));
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "r2", vec![rid("r1")], "second", Some("ab"));
        branch.append_revision(rid("r2")).unwrap();

        let request = LogRequest {
            direction: Direction::Forward,
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn limit_caps_emitted_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", None);
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "r2", vec![rid("r1")], "second", None);
        branch.append_revision(rid("r2")).unwrap();

        let request = LogRequest {
            limit: Some(1),
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision_id, rid("r2"));
    }

    #[test]
    fn message_search_filters_by_regex() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "fix the bug", None);
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "r2", vec![rid("r1")], "add a feature", None);
        branch.append_revision(rid("r2")).unwrap();

        let request = LogRequest {
            message_search: Some("FIX".to_string()),
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision_id, rid("r1"));
    }

    #[test]
    fn specific_fileids_restricts_to_touching_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "adds f1", Some("a"));
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "r2", vec![rid("r1")], "unrelated", None);
        branch.append_revision(rid("r2")).unwrap();
        commit(&mut repo, "r3", vec![rid("r2")], "touches f1 again", Some("ab"));
        branch.append_revision(rid("r3")).unwrap();

        let request = LogRequest {
            specific_fileids: vec![fid("f1")],
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r1"]);
    }

    #[test]
    fn full_delta_reports_added_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", Some("a"));
        branch.append_revision(rid("r1")).unwrap();

        let request = LogRequest {
            delta_type: DeltaType::Full,
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        let delta = entries[0].delta.as_ref().unwrap();
        assert!(delta.touches(&fid("f1")));
    }

    #[test]
    fn full_diff_attaches_added_lines_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", Some("hello\n"));
        branch.append_revision(rid("r1")).unwrap();

        let request = LogRequest {
            diff_type: DiffType::Full,
            ..Default::default()
        };
        let entries = generate_log(&repo, &branch, &request).unwrap();
        let diffs = entries[0].diff.as_ref().unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].lines, vec![DiffLine::Added("hello".to_string())]);
    }

    #[test]
    fn levels_one_restricts_to_mainline() {
        let dir = tempfile::tempdir().unwrap();
        let (mut branch, mut repo) = branch_and_repo(dir.path());
        commit(&mut repo, "r1", vec![], "first", None);
        branch.append_revision(rid("r1")).unwrap();
        commit(&mut repo, "side", vec![rid("r1")], "side branch", None);
        commit(&mut repo, "r2", vec![rid("r1"), rid("side")], "merge", None);
        branch.append_revision(rid("r2")).unwrap();

        let all = generate_log(&repo, &branch, &LogRequest::default()).unwrap();
        assert_eq!(all.len(), 3);

        let request = LogRequest {
            levels: 1,
            ..Default::default()
        };
        let mainline_only = generate_log(&repo, &branch, &request).unwrap();
        let ids: Vec<&str> = mainline_only.iter().map(|e| e.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }
}
