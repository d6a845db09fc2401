//! The Graph-Index wire format: spec.md §4.2 requires this to be
//! preserved bit-exact, so [`GraphIndexBuilder::finish`] and
//! [`GraphIndex::parse`] are a direct port of `bzrlib.index`'s
//! `GraphIndexBuilder`/`GraphIndex`, including the three-pass
//! offset-width computation the original uses to keep every reference
//! the same fixed digit width.

use std::collections::{BTreeMap, HashMap};

use arbor_errors::{Error, Result};

const SIGNATURE: &[u8] = b"Bazaar Graph Index 1\n";
const OPTION_NODE_REFS: &[u8] = b"node_ref_lists=";

fn is_bad_key_byte(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | 0 | b' ')
}

fn is_bad_value_byte(b: u8) -> bool {
    matches!(b, b'\n' | 0)
}

/// Builds a [`GraphIndex`]'s on-disk byte representation from a set of
/// `(key, reference_lists, value)` nodes.
pub struct GraphIndexBuilder {
    reference_lists: usize,
    nodes: BTreeMap<Vec<u8>, (Vec<Vec<Vec<u8>>>, Vec<u8>)>,
}

impl GraphIndexBuilder {
    pub fn new(reference_lists: usize) -> Self {
        GraphIndexBuilder {
            reference_lists,
            nodes: BTreeMap::new(),
        }
    }

    /// `references` must have exactly `reference_lists` entries, each a
    /// list of other keys already (or about to be) present in this
    /// builder; `value` must contain no NL or NUL.
    pub fn add_node(&mut self, key: Vec<u8>, references: Vec<Vec<Vec<u8>>>, value: Vec<u8>) -> Result<()> {
        if key.is_empty() || key.iter().any(|b| is_bad_key_byte(*b)) {
            return Err(Error::BadIndexKey(key));
        }
        if value.iter().any(|b| is_bad_value_byte(*b)) {
            return Err(Error::BadIndexValue(value));
        }
        if references.len() != self.reference_lists {
            return Err(Error::BadIndexValue(value));
        }
        for reference_list in &references {
            for reference in reference_list {
                if reference.iter().any(|b| is_bad_key_byte(*b)) {
                    return Err(Error::BadIndexKey(reference.clone()));
                }
            }
        }
        if self.nodes.contains_key(&key) {
            return Err(Error::BadIndexDuplicateKey(key));
        }
        self.nodes.insert(key, (references, value));
        Ok(())
    }

    /// Serializes the index. Nodes are written in descending key order,
    /// each reference replaced by the fixed-width decimal byte offset of
    /// the key it points to, computed in three passes exactly as the
    /// original format requires: gather non-reference byte counts, pick
    /// the minimum digit width that keeps the whole file's byte count
    /// representable in that width, then resolve addresses and emit.
    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut lines: Vec<Vec<u8>> = Vec::new();
        lines.push(SIGNATURE.to_vec());
        let mut options = OPTION_NODE_REFS.to_vec();
        options.extend_from_slice(self.reference_lists.to_string().as_bytes());
        options.push(b'\n');
        lines.push(options);
        let prefix_length: usize = lines.iter().map(|l| l.len()).sum();

        let ordered: Vec<(&Vec<u8>, &(Vec<Vec<Vec<u8>>>, Vec<u8>))> =
            self.nodes.iter().rev().collect();

        // Matches the original three-pass offset-width computation
        // exactly, including its signed arithmetic: a node with an empty
        // reference list contributes `-1` to the running byte count here
        // (it nets out against the `+1` fixed overhead, since an empty
        // reference list has no CR separators to begin with), so this
        // must stay on signed integers rather than `usize`.
        let mut non_ref_bytes: i64 = prefix_length as i64;
        let mut total_references: i64 = 0;
        for (key, (references, _value)) in &ordered {
            non_ref_bytes += key.len() as i64 + 3 + 1 + self.reference_lists as i64 - 1;
            for ref_list in references.iter() {
                total_references += ref_list.len() as i64;
                non_ref_bytes += ref_list.len() as i64 - 1;
            }
        }
        let mut digits: i64 = 1;
        let mut possible_total_bytes = non_ref_bytes + total_references * digits;
        while 10i64.pow(digits as u32) < possible_total_bytes {
            digits += 1;
            possible_total_bytes = non_ref_bytes + total_references * digits;
        }
        let digits = digits as usize;

        let mut key_addresses: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut current_offset: i64 = prefix_length as i64;
        for (key, (references, _value)) in &ordered {
            key_addresses.insert((*key).clone(), current_offset as usize);
            current_offset += key.len() as i64 + 3 + 1 + self.reference_lists as i64 - 1;
            for ref_list in references.iter() {
                current_offset += ref_list.len() as i64 - 1;
                current_offset += digits as i64 * ref_list.len() as i64;
            }
        }

        for (key, (references, value)) in &ordered {
            let mut flattened_lists: Vec<Vec<u8>> = Vec::with_capacity(references.len());
            for ref_list in references.iter() {
                let mut addresses: Vec<Vec<u8>> = Vec::with_capacity(ref_list.len());
                for reference in ref_list {
                    let address = key_addresses.get(reference).ok_or_else(|| {
                        Error::BadIndexValue(reference.clone())
                    })?;
                    addresses.push(format!("{:0width$}", address, width = digits).into_bytes());
                }
                flattened_lists.push(join_bytes(&addresses, b'\r'));
            }
            let refs_field = join_bytes(&flattened_lists, b'\t');
            let mut line = Vec::with_capacity(key.len() + refs_field.len() + value.len() + 4);
            line.extend_from_slice(key);
            line.push(0);
            line.push(0);
            line.extend_from_slice(&refs_field);
            line.push(0);
            line.extend_from_slice(value);
            line.push(b'\n');
            lines.push(line);
        }
        lines.push(b"\n".to_vec());
        Ok(lines.concat())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GraphIndexEntry {
    pub key: Vec<u8>,
    pub reference_lists: Vec<Vec<Vec<u8>>>,
    pub value: Vec<u8>,
}

/// A parsed, in-memory view of a Graph-Index file.
pub struct GraphIndex {
    pub node_ref_lists: usize,
    entries: Vec<GraphIndexEntry>,
    by_key: HashMap<Vec<u8>, usize>,
}

impl GraphIndex {
    /// Parses `bytes` into a [`GraphIndex`]. Absent-node markers (the
    /// `ABSENT` grammar slot between the two leading NULs) are not
    /// produced by [`GraphIndexBuilder`] and are rejected here as
    /// [`Error::BadIndexData`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SIGNATURE.len() || &bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err(Error::BadIndexFormatSignature("<bytes>".to_string()));
        }
        let mut offset = SIGNATURE.len();
        let options_end = find_newline(bytes, offset).ok_or_else(|| Error::BadIndexOptions("<bytes>".to_string()))?;
        let options_line = &bytes[offset..options_end];
        if !options_line.starts_with(OPTION_NODE_REFS) {
            return Err(Error::BadIndexOptions("<bytes>".to_string()));
        }
        let node_ref_lists: usize = std::str::from_utf8(&options_line[OPTION_NODE_REFS.len()..])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::BadIndexOptions("<bytes>".to_string()))?;
        offset = options_end + 1;

        struct RawNode {
            start: usize,
            key: Vec<u8>,
            raw_refs: Vec<Vec<usize>>,
            value: Vec<u8>,
        }
        let mut raw_nodes: Vec<RawNode> = Vec::new();
        let mut addr_to_key: HashMap<usize, Vec<u8>> = HashMap::new();

        loop {
            if offset >= bytes.len() {
                return Err(Error::BadIndexData("<bytes>".to_string()));
            }
            if bytes[offset] == b'\n' {
                break;
            }
            let start = offset;
            let line_end = find_newline(bytes, offset).ok_or_else(|| Error::BadIndexData("<bytes>".to_string()))?;
            let line = &bytes[offset..line_end];
            let mut parts = line.splitn(2, |b| *b == 0);
            let key = parts.next().unwrap_or_default().to_vec();
            let rest = parts.next().ok_or_else(|| Error::BadIndexData("<bytes>".to_string()))?;
            if rest.first() != Some(&0) {
                // the ABSENT marker slot: unsupported in this implementation.
                return Err(Error::BadIndexData("<bytes>".to_string()));
            }
            let rest = &rest[1..];
            let mut rest_parts = rest.splitn(2, |b| *b == 0);
            let refs_field = rest_parts.next().unwrap_or_default();
            let value = rest_parts
                .next()
                .ok_or_else(|| Error::BadIndexData("<bytes>".to_string()))?
                .to_vec();

            let mut raw_refs: Vec<Vec<usize>> = Vec::with_capacity(node_ref_lists);
            if node_ref_lists > 0 {
                for ref_list in refs_field.split(|b| *b == b'\t') {
                    let mut addrs = Vec::new();
                    if !ref_list.is_empty() {
                        for reference in ref_list.split(|b| *b == b'\r') {
                            let addr: usize = std::str::from_utf8(reference)
                                .ok()
                                .and_then(|s| s.parse().ok())
                                .ok_or_else(|| Error::BadIndexData("<bytes>".to_string()))?;
                            addrs.push(addr);
                        }
                    }
                    raw_refs.push(addrs);
                }
                if raw_refs.len() != node_ref_lists {
                    return Err(Error::BadIndexOptions("<bytes>".to_string()));
                }
            }

            addr_to_key.insert(start, key.clone());
            raw_nodes.push(RawNode {
                start,
                key,
                raw_refs,
                value,
            });
            offset = line_end + 1;
        }

        let mut entries = Vec::with_capacity(raw_nodes.len());
        let mut by_key = HashMap::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            let mut reference_lists = Vec::with_capacity(raw.raw_refs.len());
            for addrs in &raw.raw_refs {
                let mut keys = Vec::with_capacity(addrs.len());
                for addr in addrs {
                    let key = addr_to_key
                        .get(addr)
                        .ok_or_else(|| Error::BadIndexData("<bytes>".to_string()))?;
                    keys.push(key.clone());
                }
                reference_lists.push(keys);
            }
            by_key.insert(raw.key.clone(), entries.len());
            entries.push(GraphIndexEntry {
                key: raw.key,
                reference_lists,
                value: raw.value,
            });
        }

        Ok(GraphIndex {
            node_ref_lists,
            entries,
            by_key,
        })
    }

    pub fn iter_all_entries(&self) -> impl Iterator<Item = &GraphIndexEntry> {
        self.entries.iter()
    }

    /// Looks up specific keys; any key absent from the index raises
    /// [`Error::BadIndexKey`], matching `bzrlib`'s `MissingKey` behavior
    /// at the point of first absent key.
    pub fn iter_entries<'a>(&'a self, keys: &[Vec<u8>]) -> Result<Vec<&'a GraphIndexEntry>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let idx = self
                .by_key
                .get(key)
                .ok_or_else(|| Error::BadIndexKey(key.clone()))?;
            out.push(&self.entries[*idx]);
        }
        Ok(out)
    }

    /// Structural validation without building the full in-memory index:
    /// checks the signature, the options line, and that at least the
    /// trailer line is present.
    pub fn validate(bytes: &[u8]) -> Result<()> {
        if bytes.len() < SIGNATURE.len() || &bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err(Error::BadIndexFormatSignature("<bytes>".to_string()));
        }
        let options_end = find_newline(bytes, SIGNATURE.len())
            .ok_or_else(|| Error::BadIndexOptions("<bytes>".to_string()))?;
        if !bytes[SIGNATURE.len()..options_end].starts_with(OPTION_NODE_REFS) {
            return Err(Error::BadIndexOptions("<bytes>".to_string()));
        }
        let remainder = &bytes[options_end + 1..];
        if remainder.is_empty() {
            return Err(Error::BadIndexData("<bytes>".to_string()));
        }
        Ok(())
    }
}

fn join_bytes(parts: &[Vec<u8>], sep: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.extend_from_slice(part);
    }
    out
}

fn find_newline(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..].iter().position(|b| *b == b'\n').map(|p| from + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_builder_and_parser() {
        let mut builder = GraphIndexBuilder::new(1);
        builder.add_node(b"a".to_vec(), vec![vec![]], b"value-a".to_vec()).unwrap();
        builder
            .add_node(b"b".to_vec(), vec![vec![b"a".to_vec()]], b"value-b".to_vec())
            .unwrap();
        let bytes = builder.finish().unwrap();
        assert!(bytes.starts_with(SIGNATURE));

        let index = GraphIndex::parse(&bytes).unwrap();
        assert_eq!(index.node_ref_lists, 1);
        let entries: HashMap<Vec<u8>, &GraphIndexEntry> = index
            .iter_all_entries()
            .map(|e| (e.key.clone(), e))
            .collect();
        assert_eq!(entries[&b"a".to_vec()].value, b"value-a");
        assert_eq!(entries[&b"b".to_vec()].value, b"value-b");
        assert_eq!(entries[&b"b".to_vec()].reference_lists, vec![vec![b"a".to_vec()]]);
    }

    #[test]
    fn reserialized_bytes_are_byte_identical() {
        let mut builder = GraphIndexBuilder::new(2);
        builder
            .add_node(b"k1".to_vec(), vec![vec![], vec![]], b"v1".to_vec())
            .unwrap();
        builder
            .add_node(b"k2".to_vec(), vec![vec![b"k1".to_vec()], vec![]], b"v2".to_vec())
            .unwrap();
        let bytes = builder.finish().unwrap();
        let index = GraphIndex::parse(&bytes).unwrap();

        let mut rebuilt = GraphIndexBuilder::new(index.node_ref_lists);
        for entry in index.iter_all_entries() {
            rebuilt
                .add_node(entry.key.clone(), entry.reference_lists.clone(), entry.value.clone())
                .unwrap();
        }
        let bytes2 = rebuilt.finish().unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut builder = GraphIndexBuilder::new(0);
        builder.add_node(b"a".to_vec(), vec![], b"v".to_vec()).unwrap();
        assert!(matches!(
            builder.add_node(b"a".to_vec(), vec![], b"v2".to_vec()),
            Err(Error::BadIndexDuplicateKey(_))
        ));
    }

    #[test]
    fn whitespace_in_key_is_rejected() {
        let mut builder = GraphIndexBuilder::new(0);
        assert!(matches!(
            builder.add_node(b"has space".to_vec(), vec![], b"v".to_vec()),
            Err(Error::BadIndexKey(_))
        ));
    }

    #[test]
    fn newline_in_value_is_rejected() {
        let mut builder = GraphIndexBuilder::new(0);
        assert!(matches!(
            builder.add_node(b"k".to_vec(), vec![], b"has\nnewline".to_vec()),
            Err(Error::BadIndexValue(_))
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        assert!(matches!(
            GraphIndex::parse(b"not an index"),
            Err(Error::BadIndexFormatSignature(_))
        ));
    }

    #[quickcheck_macros::quickcheck]
    fn index_round_trip_is_byte_exact(keys: Vec<String>) -> bool {
        let mut unique_keys: Vec<String> = keys
            .into_iter()
            .filter(|k| !k.is_empty() && !k.bytes().any(is_bad_key_byte))
            .collect();
        unique_keys.sort();
        unique_keys.dedup();
        if unique_keys.len() > 20 {
            unique_keys.truncate(20);
        }

        let mut builder = GraphIndexBuilder::new(0);
        for key in &unique_keys {
            if builder.add_node(key.as_bytes().to_vec(), vec![], b"v".to_vec()).is_err() {
                return true;
            }
        }
        let bytes = match builder.finish() {
            Ok(b) => b,
            Err(_) => return true,
        };
        let index = match GraphIndex::parse(&bytes) {
            Ok(i) => i,
            Err(_) => return false,
        };
        let mut rebuilt = GraphIndexBuilder::new(index.node_ref_lists);
        for entry in index.iter_all_entries() {
            if rebuilt
                .add_node(entry.key.clone(), entry.reference_lists.clone(), entry.value.clone())
                .is_err()
            {
                return false;
            }
        }
        let bytes2 = match rebuilt.finish() {
            Ok(b) => b,
            Err(_) => return false,
        };
        bytes == bytes2
    }
}
