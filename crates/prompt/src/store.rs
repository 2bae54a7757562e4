//! Per-assembly segment store.
//!
//! A store never holds an empty or all-whitespace text segment: writing one
//! clears the slot. Stores are created fresh for every assembly call.

use crate::segments::{SegmentName, SegmentPatch, SegmentValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Segments that must be present for a store to validate.
pub const REQUIRED_SEGMENTS: &[SegmentName] = &[SegmentName::CharacterOverview];

const PREVIEW_CHARS: usize = 100;

static ABSENT: SegmentValue = SegmentValue::Absent;

/// Advisory result of [`SegmentStore::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Keyed segment contents for one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentStore {
    segments: HashMap<SegmentName, SegmentValue>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store trimmed `content`, or clear the slot when it is blank.
    pub fn set(&mut self, name: SegmentName, content: &str) {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            self.segments.remove(&name);
        } else {
            self.segments
                .insert(name, SegmentValue::Text(trimmed.to_string()));
        }
    }

    /// Store a dynamic value verbatim; an empty map clears the slot.
    pub fn set_dynamic(&mut self, name: SegmentName, entries: IndexMap<String, String>) {
        if entries.is_empty() {
            self.segments.remove(&name);
        } else {
            self.segments.insert(name, SegmentValue::Dynamic(entries));
        }
    }

    /// Remove a segment.
    pub fn clear(&mut self, name: SegmentName) {
        self.segments.remove(&name);
    }

    /// Apply every entry of `patch`.
    ///
    /// Blank text entries are skipped and leave any existing value alone;
    /// dynamic entries are written as given.
    pub fn set_many(&mut self, patch: SegmentPatch) {
        for (name, value) in patch {
            match value {
                SegmentValue::Text(text) if !text.trim().is_empty() => self.set(name, &text),
                SegmentValue::Text(_) | SegmentValue::Absent => {}
                SegmentValue::Dynamic(entries) => self.set_dynamic(name, entries),
            }
        }
    }

    /// Overlay `sources` left to right; later sources win.
    pub fn merge<'a>(&mut self, sources: impl IntoIterator<Item = &'a SegmentStore>) {
        for source in sources {
            for (name, value) in &source.segments {
                match value {
                    SegmentValue::Text(text) => self.set(*name, text),
                    SegmentValue::Dynamic(entries) => self.set_dynamic(*name, entries.clone()),
                    SegmentValue::Absent => {}
                }
            }
        }
    }

    /// The value for `name`, `Absent` when unset.
    pub fn get(&self, name: SegmentName) -> &SegmentValue {
        self.segments.get(&name).unwrap_or(&ABSENT)
    }

    pub fn has(&self, name: SegmentName) -> bool {
        self.segments.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Present segment names in vocabulary order.
    pub fn present(&self) -> Vec<SegmentName> {
        SegmentName::ALL
            .iter()
            .copied()
            .filter(|name| self.has(*name))
            .collect()
    }

    /// Check required segments and warn about every empty one.
    ///
    /// Advisory only; assembly proceeds regardless.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for name in SegmentName::ALL {
            if self.has(*name) {
                continue;
            }
            if REQUIRED_SEGMENTS.contains(name) {
                report
                    .errors
                    .push(format!("Required segment '{}' is missing", name));
            } else {
                report.warnings.push(format!("Segment '{}' is empty", name));
            }
        }

        report.valid = report.errors.is_empty();
        report
    }

    /// One line per present segment, truncated, for debugging.
    pub fn preview(&self) -> String {
        self.present()
            .into_iter()
            .map(|name| match self.get(name) {
                SegmentValue::Text(text) => {
                    let head: String = text.chars().take(PREVIEW_CHARS).collect();
                    let ellipsis = if text.chars().count() > PREVIEW_CHARS {
                        "..."
                    } else {
                        ""
                    };
                    format!("[{}]: {}{}", name, head, ellipsis)
                }
                SegmentValue::Dynamic(entries) => {
                    let keys: Vec<&str> = entries.keys().map(|k| k.as_str()).collect();
                    format!("[{}]: {{{}}}", name, keys.join(", "))
                }
                SegmentValue::Absent => format!("[{}]: <absent>", name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
