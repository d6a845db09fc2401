//! Canonical byte serialization for [`Revision`], the repository-layer
//! counterpart to [`arbor_model::Inventory::to_canonical_bytes`]: the
//! concrete on-disk syntax is implementation-defined (spec.md §4.3 only
//! requires that re-serializing a parsed value reproduce the same bytes),
//! so this is a simple line-oriented format rather than a port of
//! bzrlib's XML revision serializer, which is not part of the retrieved
//! source.

use std::collections::BTreeMap;

use arbor_errors::{Error, Result};
use arbor_model::{EntryKind, FileId, Inventory, InventoryEntry, Revision, RevisionId};

pub fn serialize_revision(rev: &Revision) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("revision-id: ");
    out.push_str(rev.revision_id.as_str());
    out.push('\n');
    out.push_str("committer: ");
    out.push_str(&rev.committer);
    out.push('\n');
    out.push_str("timestamp: ");
    out.push_str(&rev.timestamp.to_string());
    out.push('\n');
    out.push_str("timezone: ");
    out.push_str(&rev.timezone.to_string());
    out.push('\n');
    out.push_str("inventory-sha1: ");
    out.push_str(&rev.inventory_sha1);
    out.push('\n');
    for parent in &rev.parent_ids {
        out.push_str("parent: ");
        out.push_str(parent.as_str());
        out.push('\n');
    }
    for (k, v) in &rev.properties {
        out.push_str("property: ");
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    let message_bytes = rev.message.as_bytes();
    out.push_str("message-length: ");
    out.push_str(&message_bytes.len().to_string());
    out.push('\n');
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(message_bytes);
    bytes
}

pub fn deserialize_revision(bytes: &[u8]) -> Result<Revision> {
    let header_len = find_header_len(bytes)?;
    let header = std::str::from_utf8(&bytes[..header_len])
        .map_err(|_| Error::Bug("revision header is not valid utf-8".to_string()))?;

    let mut revision_id: Option<RevisionId> = None;
    let mut committer = String::new();
    let mut timestamp = 0.0f64;
    let mut timezone = 0i32;
    let mut inventory_sha1 = String::new();
    let mut parent_ids = Vec::new();
    let mut properties = BTreeMap::new();
    let mut message_length: Option<usize> = None;

    for line in header.lines() {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| Error::Bug(format!("malformed revision header line {line:?}")))?;
        match key {
            "revision-id" => revision_id = Some(RevisionId::new(value)?),
            "committer" => committer = value.to_string(),
            "timestamp" => {
                timestamp = value
                    .parse()
                    .map_err(|_| Error::Bug(format!("bad timestamp {value:?}")))?
            }
            "timezone" => {
                timezone = value
                    .parse()
                    .map_err(|_| Error::Bug(format!("bad timezone {value:?}")))?
            }
            "inventory-sha1" => inventory_sha1 = value.to_string(),
            "parent" => parent_ids.push(RevisionId::new(value)?),
            "property" => {
                let (k, v) = value
                    .split_once('=')
                    .ok_or_else(|| Error::Bug(format!("malformed property {value:?}")))?;
                properties.insert(k.to_string(), v.to_string());
            }
            "message-length" => {
                message_length = Some(
                    value
                        .parse()
                        .map_err(|_| Error::Bug(format!("bad message-length {value:?}")))?,
                )
            }
            other => return Err(Error::Bug(format!("unknown revision field {other:?}"))),
        }
    }

    let revision_id =
        revision_id.ok_or_else(|| Error::Bug("revision missing revision-id".to_string()))?;
    let message_length =
        message_length.ok_or_else(|| Error::Bug("revision missing message-length".to_string()))?;
    let message_bytes = &bytes[header_len..];
    if message_bytes.len() != message_length {
        return Err(Error::Bug(format!(
            "revision message length mismatch: header says {message_length}, found {}",
            message_bytes.len()
        )));
    }
    let message = std::str::from_utf8(message_bytes)
        .map_err(|_| Error::Bug("revision message is not valid utf-8".to_string()))?
        .to_string();

    Ok(Revision {
        revision_id,
        committer,
        timestamp,
        timezone,
        message,
        parent_ids,
        inventory_sha1,
        properties,
    })
}

/// Finds the end of the `message-length: N\n` line, which marks the end
/// of the header and the start of the raw message bytes.
fn find_header_len(bytes: &[u8]) -> Result<usize> {
    const MARKER: &[u8] = b"message-length: ";
    let mut start = 0;
    while start < bytes.len() {
        let rest = &bytes[start..];
        if rest.starts_with(MARKER) {
            let nl = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| Error::Bug("unterminated message-length line".to_string()))?;
            return Ok(start + nl + 1);
        }
        match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => start += nl + 1,
            None => break,
        }
    }
    Err(Error::Bug("revision has no message-length field".to_string()))
}

/// Parses the `<entry .../>` lines [`Inventory::to_canonical_bytes`]
/// produces back into an [`Inventory`]. Entries are inserted in a
/// worklist order (root first, then any entry whose parent is already
/// present) rather than file-id order, since the canonical form's
/// `BTreeMap` key order does not itself guarantee parent-before-child.
pub fn deserialize_inventory(bytes: &[u8]) -> Result<Inventory> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Bug("inventory is not valid utf-8".to_string()))?;
    let mut lines = text.lines();
    match lines.next() {
        Some("<inventory>") => {}
        other => return Err(Error::Bug(format!("expected <inventory>, found {other:?}"))),
    }

    let mut pending = Vec::new();
    for line in lines {
        if line == "</inventory>" || line.is_empty() {
            continue;
        }
        pending.push(parse_entry_line(line)?);
    }

    let mut inv = Inventory::new();
    loop {
        let mut progressed = false;
        let mut still_pending = Vec::new();
        for entry in pending {
            let ready = match &entry.parent_id {
                None => true,
                Some(parent_id) => inv.get(parent_id).is_some(),
            };
            if ready {
                inv.add(entry)?;
                progressed = true;
            } else {
                still_pending.push(entry);
            }
        }
        pending = still_pending;
        if pending.is_empty() {
            break;
        }
        if !progressed {
            return Err(Error::Bug(
                "inventory entries reference unknown parents".to_string(),
            ));
        }
    }
    Ok(inv)
}

fn parse_entry_line(line: &str) -> Result<InventoryEntry> {
    let chars: Vec<char> = line.chars().collect();
    let mut pos = 0;
    let mut attrs: BTreeMap<String, String> = BTreeMap::new();
    while pos < chars.len() {
        if chars[pos].is_ascii_alphabetic() {
            let (key, value, next) = parse_attr(&chars, pos)?;
            attrs.insert(key, value);
            pos = next;
        } else {
            pos += 1;
        }
    }

    let file_id = FileId::new(attr(&attrs, "file_id")?)?;
    let kind = match attr(&attrs, "kind")?.as_str() {
        "dir" => EntryKind::Directory,
        "file" => EntryKind::File,
        "symlink" => EntryKind::Symlink,
        "tree-reference" => EntryKind::TreeReference,
        other => return Err(Error::Bug(format!("unknown inventory entry kind {other:?}"))),
    };
    let name = attr(&attrs, "name")?.clone();
    let parent_id = non_empty(attr(&attrs, "parent_id")?)
        .map(FileId::new)
        .transpose()?;
    let revision = RevisionId::new(attr(&attrs, "revision")?)?;
    let text_sha1 = non_empty(attr(&attrs, "text_sha1")?).map(|s| s.to_string());
    let text_size = non_empty(attr(&attrs, "text_size")?)
        .map(|s| s.parse::<u64>())
        .transpose()
        .map_err(|_| Error::Bug("bad text_size".to_string()))?;
    let symlink_target = non_empty(attr(&attrs, "symlink_target")?).map(|s| s.to_string());

    Ok(InventoryEntry {
        file_id,
        kind,
        name,
        parent_id,
        revision,
        text_sha1,
        text_size,
        symlink_target,
    })
}

fn attr<'a>(attrs: &'a BTreeMap<String, String>, key: &str) -> Result<&'a String> {
    attrs
        .get(key)
        .ok_or_else(|| Error::Bug(format!("inventory entry missing attribute {key:?}")))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Reads one `key="value"` pair (Rust `Debug`-quoted) starting at the
/// first character of `key`. Returns the decoded value and the position
/// just past the closing quote.
fn parse_attr(chars: &[char], pos: usize) -> Result<(String, String, usize)> {
    let key_start = pos;
    let mut i = pos;
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let key: String = chars[key_start..i].iter().collect();
    if i + 1 >= chars.len() || chars[i] != '=' || chars[i + 1] != '"' {
        return Err(Error::Bug(format!("malformed attribute {key:?} in inventory entry")));
    }
    i += 2;
    let mut value = String::new();
    loop {
        if i >= chars.len() {
            return Err(Error::Bug("unterminated attribute value".to_string()));
        }
        match chars[i] {
            '"' => {
                i += 1;
                break;
            }
            '\\' => {
                i += 1;
                let escaped = *chars
                    .get(i)
                    .ok_or_else(|| Error::Bug("dangling escape in attribute value".to_string()))?;
                value.push(match escaped {
                    '"' => '"',
                    '\\' => '\\',
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 1;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Ok((key, value, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_inventory_with_nested_entries() {
        let root = FileId::new("root-id").unwrap();
        let mut inv = Inventory::empty_tree(root.clone());
        inv.add(InventoryEntry {
            file_id: FileId::new("dir-1").unwrap(),
            kind: EntryKind::Directory,
            name: "src".to_string(),
            parent_id: Some(root.clone()),
            revision: RevisionId::new("rev-1").unwrap(),
            text_sha1: None,
            text_size: None,
            symlink_target: None,
        })
        .unwrap();
        inv.add(InventoryEntry {
            file_id: FileId::new("file-1").unwrap(),
            kind: EntryKind::File,
            name: "main.rs".to_string(),
            parent_id: Some(FileId::new("dir-1").unwrap()),
            revision: RevisionId::new("rev-1").unwrap(),
            text_sha1: Some("abc123".to_string()),
            text_size: Some(42),
            symlink_target: None,
        })
        .unwrap();

        let bytes = inv.to_canonical_bytes();
        let parsed = deserialize_inventory(&bytes).unwrap();
        assert_eq!(parsed, inv);
        assert_eq!(parsed.to_canonical_bytes(), bytes);
    }

    #[test]
    fn round_trips_a_revision_with_parents_and_properties() {
        let mut rev = Revision::new(RevisionId::new("r2").unwrap(), "deadbeef");
        rev.committer = "Jane Doe <jane@example.com>".to_string();
        rev.timestamp = 1234567890.5;
        rev.timezone = -18000;
        rev.message = "fix the thing\nsecond line".to_string();
        rev.parent_ids = vec![RevisionId::new("r1").unwrap()];
        rev.properties.insert("branch-nick".to_string(), "trunk".to_string());

        let bytes = serialize_revision(&rev);
        let parsed = deserialize_revision(&bytes).unwrap();
        assert_eq!(parsed, rev);
    }

    #[test]
    fn round_trips_a_rootless_revision_with_empty_message() {
        let rev = Revision::new(RevisionId::new("r1").unwrap(), "sha1");
        let bytes = serialize_revision(&rev);
        let parsed = deserialize_revision(&bytes).unwrap();
        assert_eq!(parsed, rev);
    }

    #[test]
    fn reserializing_a_parsed_revision_is_byte_identical() {
        let mut rev = Revision::new(RevisionId::new("r1").unwrap(), "sha1");
        rev.message = "hello".to_string();
        let first = serialize_revision(&rev);
        let parsed = deserialize_revision(&first).unwrap();
        let second = serialize_revision(&parsed);
        assert_eq!(first, second);
    }
}
