//! Per-file text diffs (spec.md §4.8 `diff_type`). No diff crate
//! appears anywhere in the workspace's dependency stack, so this is a
//! small in-house line-level diff rather than an imported one — a
//! classic longest-common-subsequence backtrace, adequate for the text
//! sizes a revision log deals with.

use arbor_model::FileId;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileDiff {
    pub file_id: FileId,
    pub path: String,
    pub lines: Vec<DiffLine>,
}

/// A line-level diff between `before` (absent for a newly added file)
/// and `after`.
pub fn diff_lines(before: Option<&[u8]>, after: &[u8]) -> Vec<DiffLine> {
    let before_lines = split_lines(before.unwrap_or(&[]));
    let after_lines = split_lines(after);

    if before.is_none() {
        return after_lines.into_iter().map(DiffLine::Added).collect();
    }

    let lcs = longest_common_subsequence(&before_lines, &after_lines);
    let mut out = Vec::with_capacity(before_lines.len() + after_lines.len());
    let (mut bi, mut ai, mut li) = (0usize, 0usize, 0usize);
    while bi < before_lines.len() || ai < after_lines.len() {
        if li < lcs.len() && bi < before_lines.len() && ai < after_lines.len() && before_lines[bi] == lcs[li] && after_lines[ai] == lcs[li] {
            out.push(DiffLine::Context(before_lines[bi].clone()));
            bi += 1;
            ai += 1;
            li += 1;
        } else if bi < before_lines.len() && (li >= lcs.len() || before_lines[bi] != lcs[li]) {
            out.push(DiffLine::Removed(before_lines[bi].clone()));
            bi += 1;
        } else if ai < after_lines.len() {
            out.push(DiffLine::Added(after_lines[ai].clone()));
            ai += 1;
        }
    }
    out
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

fn longest_common_subsequence(a: &[String], b: &[String]) -> Vec<String> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if a[i] == b[j] {
            out.push(a[i].clone());
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_is_all_additions() {
        let lines = diff_lines(None, b"one\ntwo\n");
        assert_eq!(lines, vec![DiffLine::Added("one".into()), DiffLine::Added("two".into())]);
    }

    #[test]
    fn identical_content_is_all_context() {
        let lines = diff_lines(Some(b"one\ntwo\n"), b"one\ntwo\n");
        assert!(lines.iter().all(|l| matches!(l, DiffLine::Context(_))));
    }

    #[test]
    fn single_line_change_is_localized() {
        let lines = diff_lines(Some(b"one\ntwo\nthree\n"), b"one\nTWO\nthree\n");
        assert_eq!(
            lines,
            vec![
                DiffLine::Context("one".into()),
                DiffLine::Removed("two".into()),
                DiffLine::Added("TWO".into()),
                DiffLine::Context("three".into()),
            ]
        );
    }
}
