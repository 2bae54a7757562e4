//! Line-based change telemetry for rewrites.
//!
//! Lines are compared pairwise by index, not aligned; an inserted line near
//! the top therefore shows up as a run of changed lines. The summary is for
//! logs only and never feeds back into the rewrite.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive, 1-based range of line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Summary of what a rewrite changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub added: Vec<LineRange>,
    pub removed: Vec<LineRange>,
    pub changed: Vec<LineRange>,
    pub unchanged: usize,
    pub char_delta: i64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineChange {
    Unchanged,
    Added,
    Removed,
    Changed,
}

impl DiffSummary {
    /// Compare `before` and `after` line by line.
    pub fn compute(before: &str, after: &str) -> Self {
        let left: Vec<&str> = before.split('\n').collect();
        let right: Vec<&str> = after.split('\n').collect();
        let len = left.len().max(right.len());

        let mut summary = DiffSummary {
            char_delta: after.chars().count() as i64 - before.chars().count() as i64,
            ..Default::default()
        };

        for idx in 0..len {
            let l = left.get(idx).copied().unwrap_or("");
            let r = right.get(idx).copied().unwrap_or("");

            let change = if l == r {
                LineChange::Unchanged
            } else if l.is_empty() {
                LineChange::Added
            } else if r.is_empty() {
                LineChange::Removed
            } else {
                LineChange::Changed
            };

            let line = idx + 1;
            match change {
                LineChange::Unchanged => summary.unchanged += 1,
                LineChange::Added => push_line(&mut summary.added, line),
                LineChange::Removed => push_line(&mut summary.removed, line),
                LineChange::Changed => push_line(&mut summary.changed, line),
            }
        }

        summary
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

// Extend the last range when the line is contiguous, else open a new one.
fn push_line(ranges: &mut Vec<LineRange>, line: usize) {
    match ranges.last_mut() {
        Some(last) if last.end + 1 == line => last.end = line,
        _ => ranges.push(LineRange {
            start: line,
            end: line,
        }),
    }
}

fn write_ranges(f: &mut fmt::Formatter<'_>, label: &str, ranges: &[LineRange]) -> fmt::Result {
    let single = ranges.len() == 1 && ranges[0].start == ranges[0].end;
    let noun = if single { "line" } else { "lines" };
    let joined = ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    write!(f, "{} {} {}; ", label, noun, joined)
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no changes");
        }
        if !self.changed.is_empty() {
            write_ranges(f, "changed", &self.changed)?;
        }
        if !self.added.is_empty() {
            write_ranges(f, "added", &self.added)?;
        }
        if !self.removed.is_empty() {
            write_ranges(f, "removed", &self.removed)?;
        }
        write!(f, "chars {:+}", self.char_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_has_no_changes() {
        let diff = DiffSummary::compute("a\nb", "a\nb");
        assert!(diff.is_empty());
        assert_eq!(diff.unchanged, 2);
        assert_eq!(diff.to_string(), "no changes");
    }

    #[test]
    fn test_classifies_lines_by_index() {
        let before = "keep\nold\n\ngone\nx";
        let after = "keep\nnew\nfresh\n\ny";
        let diff = DiffSummary::compute(before, after);

        assert_eq!(
            diff.changed,
            vec![LineRange { start: 2, end: 2 }, LineRange { start: 5, end: 5 }]
        );
        assert_eq!(diff.added, vec![LineRange { start: 3, end: 3 }]);
        assert_eq!(diff.removed, vec![LineRange { start: 4, end: 4 }]);
        assert_eq!(diff.unchanged, 1);
    }

    #[test]
    fn test_contiguous_lines_collapse_into_ranges() {
        let diff = DiffSummary::compute("a\nb\nc", "x\ny\nz\nw");
        assert_eq!(diff.changed, vec![LineRange { start: 1, end: 3 }]);
        assert_eq!(diff.added, vec![LineRange { start: 4, end: 4 }]);
        assert_eq!(diff.char_delta, 2);
        assert_eq!(diff.to_string(), "changed lines 1-3; added line 4; chars +2");
    }
}
