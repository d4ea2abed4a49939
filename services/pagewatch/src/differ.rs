//! Content hashing, change verdicts, and truncated diff generation

use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

use crate::snapshot::SnapshotEntry;

/// SHA-256 hex digest of content; a cheap, low-false-positive change
/// fingerprint
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Size budget applied to generated diffs, in order: per-line character
/// cap, maximum line count, maximum total characters
#[derive(Debug, Clone)]
pub struct DiffLimits {
    pub max_line_chars: usize,
    pub max_lines: usize,
    pub max_total_chars: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_line_chars: 300,
            max_lines: 100,
            max_total_chars: 6_000,
        }
    }
}

/// Verdict of comparing a new observation against the previous one
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub changed: bool,
    pub is_first_run: bool,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
    pub diff: String,
    pub error: Option<String>,
}

impl ChangeResult {
    /// Result for a resource whose fetch failed terminally
    pub fn from_error(message: &str) -> Self {
        Self {
            changed: false,
            is_first_run: false,
            old_hash: None,
            new_hash: None,
            diff: String::new(),
            error: Some(message.to_string()),
        }
    }
}

/// Compare a new entry against the previous one (if any) by content hash
pub fn compare(
    previous: Option<&SnapshotEntry>,
    entry: &SnapshotEntry,
    limits: &DiffLimits,
) -> ChangeResult {
    match previous {
        None => ChangeResult {
            changed: false,
            is_first_run: true,
            old_hash: None,
            new_hash: Some(entry.hash.clone()),
            diff: String::new(),
            error: None,
        },
        Some(prev) => {
            let changed = prev.hash != entry.hash;
            let diff = if changed {
                build_diff(&prev.content, &entry.content, limits)
            } else {
                String::new()
            };
            ChangeResult {
                changed,
                is_first_run: false,
                old_hash: Some(prev.hash.clone()),
                new_hash: Some(entry.hash.clone()),
                diff,
                error: None,
            }
        }
    }
}

/// Line diff containing additions and removals only; unchanged context is
/// omitted to keep alerts short
pub fn build_diff(old: &str, new: &str, limits: &DiffLimits) -> String {
    let text_diff = TextDiff::from_lines(old, new);
    let mut lines = Vec::new();
    for change in text_diff.iter_all_changes() {
        let value = change.value().trim_end_matches('\n').trim_end_matches('\r');
        match change.tag() {
            ChangeTag::Delete => lines.push(format!("- {}", value)),
            ChangeTag::Insert => lines.push(format!("+ {}", value)),
            ChangeTag::Equal => {}
        }
    }
    truncate_lines(lines, limits)
}

/// Apply the three-stage size budget to an existing diff. Re-truncating
/// output with the same limits is a no-op.
pub fn truncate_diff(diff: &str, limits: &DiffLimits) -> String {
    truncate_lines(diff.lines().map(str::to_string).collect(), limits)
}

fn truncate_lines(lines: Vec<String>, limits: &DiffLimits) -> String {
    let lines: Vec<String> = lines
        .into_iter()
        .map(|line| cap_line(line, limits.max_line_chars))
        .collect();
    let lines = cap_line_count(lines, limits.max_lines);
    cap_total_chars(lines, limits.max_total_chars)
}

/// Cap one line's character count. The marker counts against the cap, so a
/// capped line is exactly `max` characters and passes untouched next time.
fn cap_line(line: String, max: usize) -> String {
    let total = line.chars().count();
    if total <= max {
        return line;
    }

    let mut omitted = total - max;
    loop {
        let marker = format!(" …(+{} chars)", omitted);
        let keep = max.saturating_sub(marker.chars().count());
        let actual = total - keep;
        if actual == omitted {
            let mut capped: String = line.chars().take(keep).collect();
            capped.push_str(&marker);
            return capped;
        }
        omitted = actual;
    }
}

/// Cap the number of diff lines; the marker line takes the last slot
fn cap_line_count(mut lines: Vec<String>, max: usize) -> Vec<String> {
    if lines.len() <= max {
        return lines;
    }

    let keep = max.saturating_sub(1);
    let omitted = lines.len() - keep;
    lines.truncate(keep);
    lines.push(format!("… {} more diff lines omitted", omitted));
    lines
}

/// Cap the total character count by dropping whole trailing lines, so the
/// result never exceeds the earlier stages' budgets either
fn cap_total_chars(lines: Vec<String>, max: usize) -> String {
    let total = joined_chars(&lines);
    if total <= max {
        return lines.join("\n");
    }

    let mut kept = lines;
    while kept.pop().is_some() {
        let kept_chars = joined_chars(&kept);
        let omitted = total - kept_chars;
        let marker = format!("… ({} chars omitted)", omitted);
        let separator = usize::from(!kept.is_empty());
        if kept_chars + separator + marker.chars().count() <= max {
            let mut out = kept.join("\n");
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&marker);
            return out;
        }
    }

    format!("… ({} chars omitted)", total)
}

fn joined_chars(lines: &[String]) -> usize {
    let content: usize = lines.iter().map(|line| line.chars().count()).sum();
    content + lines.len().saturating_sub(1)
}
