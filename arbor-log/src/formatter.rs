//! `LogFormatter`: turns a [`LogEntry`] into the terminal-ready text a
//! log command prints, the Rust shape of `bzrlib.log.LogFormatter` and
//! its `long`/`short`/`line` subclasses. Column widths and color are
//! not specified beyond this and are this crate's own choice rather
//! than anything spec.md pins down.

use crate::pipeline::LogEntry;

pub trait LogFormatter {
    fn format(&self, entry: &LogEntry) -> String;
}

fn revno_str(revno: &[u32]) -> String {
    revno.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".")
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

/// One full block per revision: revno, merge-depth (when nested),
/// committer, timestamp, tags and the full commit message — the most
/// verbose of the three styles.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongFormatter;

impl LogFormatter for LongFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut out = String::new();
        out.push_str("------------------------------------------------------------\n");
        out.push_str(&format!("revno: {}", revno_str(&entry.revno)));
        if entry.merge_depth > 0 {
            out.push_str(&format!(" [merged, depth {}]", entry.merge_depth));
        }
        out.push('\n');
        if !entry.tags.is_empty() {
            out.push_str(&format!("tags: {}\n", entry.tags.join(", ")));
        }
        out.push_str(&format!("committer: {}\n", entry.revision.committer));
        out.push_str(&format!("timestamp: {}\n", entry.revision.timestamp));
        out.push_str("message:\n");
        for line in entry.revision.message.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// One line of metadata plus the commit message's first line.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortFormatter;

impl LogFormatter for ShortFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        format!(
            "{:>6} {}  {}\n",
            revno_str(&entry.revno),
            entry.revision.committer,
            first_line(&entry.revision.message)
        )
    }
}

/// The most compact style: one line per revision, no metadata block.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormatter;

impl LogFormatter for LineFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        format!(
            "{}: {} {}\n",
            revno_str(&entry.revno),
            entry.revision_id,
            first_line(&entry.revision.message)
        )
    }
}
