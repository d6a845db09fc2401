//! Line-based delta encoding between two fulltexts: a greedy longest-run
//! matcher, not a minimal diff, but always correct to reconstruct and
//! cheap to compute — the same tradeoff `bzrlib`'s weave/knit format
//! makes, where matching quality only affects storage size, never
//! correctness.

use std::collections::HashMap;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeltaOp {
    /// Copy `len` bytes from the base fulltext starting at `offset`.
    Copy { offset: usize, len: usize },
    /// Insert these literal bytes.
    Insert(Vec<u8>),
}

fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            lines.push(&bytes[start..=i]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push(&bytes[start..]);
    }
    lines
}

/// Encodes `target` as a sequence of copy/insert operations against
/// `base`. Applying the result to `base` always reproduces `target`
/// exactly, regardless of how good the line matches found are.
pub fn diff_bytes(base: &[u8], target: &[u8]) -> Vec<DeltaOp> {
    let base_lines = split_lines(base);
    let mut line_offsets = Vec::with_capacity(base_lines.len());
    let mut offset = 0usize;
    for line in &base_lines {
        line_offsets.push(offset);
        offset += line.len();
    }

    let mut index: HashMap<&[u8], Vec<usize>> = HashMap::new();
    for (i, line) in base_lines.iter().enumerate() {
        index.entry(line).or_default().push(i);
    }

    let target_lines = split_lines(target);
    let mut ops: Vec<DeltaOp> = Vec::new();
    let mut pending_insert: Vec<u8> = Vec::new();
    let mut i = 0usize;
    while i < target_lines.len() {
        let candidates = index.get(target_lines[i]);
        let run = candidates.and_then(|positions| {
            positions
                .iter()
                .map(|&start| {
                    let mut len = 0usize;
                    while i + len < target_lines.len()
                        && start + len < base_lines.len()
                        && base_lines[start + len] == target_lines[i + len]
                    {
                        len += 1;
                    }
                    (start, len)
                })
                .max_by_key(|&(_, len)| len)
        });
        match run {
            Some((start, len)) if len > 0 => {
                if !pending_insert.is_empty() {
                    ops.push(DeltaOp::Insert(std::mem::take(&mut pending_insert)));
                }
                let byte_len: usize = base_lines[start..start + len].iter().map(|l| l.len()).sum();
                ops.push(DeltaOp::Copy {
                    offset: line_offsets[start],
                    len: byte_len,
                });
                i += len;
            }
            _ => {
                pending_insert.extend_from_slice(target_lines[i]);
                i += 1;
            }
        }
    }
    if !pending_insert.is_empty() {
        ops.push(DeltaOp::Insert(pending_insert));
    }
    ops
}

/// Reassembles a fulltext by applying `ops` against `base`.
pub fn apply_delta(base: &[u8], ops: &[DeltaOp]) -> Vec<u8> {
    let mut out = Vec::new();
    for op in ops {
        match op {
            DeltaOp::Copy { offset, len } => out.extend_from_slice(&base[*offset..*offset + *len]),
            DeltaOp::Insert(bytes) => out.extend_from_slice(bytes),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_identical_content() {
        let base = b"a\nb\nc\n".to_vec();
        let ops = diff_bytes(&base, &base);
        assert_eq!(apply_delta(&base, &ops), base);
    }

    #[test]
    fn round_trips_appended_line() {
        let base = b"a\nb\nc\n".to_vec();
        let target = b"a\nb\nc\nd\n".to_vec();
        let ops = diff_bytes(&base, &target);
        assert_eq!(apply_delta(&base, &ops), target);
    }

    #[test]
    fn round_trips_inserted_middle_line() {
        let base = b"a\nb\nc\n".to_vec();
        let target = b"a\nx\nb\nc\n".to_vec();
        let ops = diff_bytes(&base, &target);
        assert_eq!(apply_delta(&base, &ops), target);
    }

    #[test]
    fn round_trips_completely_unrelated_content() {
        let base = b"a\nb\nc\n".to_vec();
        let target = b"completely different\n".to_vec();
        let ops = diff_bytes(&base, &target);
        assert_eq!(apply_delta(&base, &ops), target);
    }

    #[quickcheck_macros::quickcheck]
    fn round_trips_arbitrary_inputs(base: Vec<u8>, target: Vec<u8>) -> bool {
        let ops = diff_bytes(&base, &target);
        apply_delta(&base, &ops) == target
    }
}
