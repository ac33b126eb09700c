//! Roadmap record assembly
//!
//! The breakdown stream is plain text, one record per line:
//!
//! ```text
//! Calculus: Limits | Derivatives | Integrals
//! Limits: One-sided limits | Continuity
//! ```
//!
//! Fragments arrive split at arbitrary positions; [`RecordAssembler`] buffers
//! them and releases a [`RoadmapRecord`] each time a line closes.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Separator between a record's label and its children
pub const LABEL_SEPARATOR: char = ':';

/// Delimiter between child labels
pub const CHILD_DELIMITER: char = '|';

/// One complete `label: child | child | …` line
///
/// Neither the label nor the children may contain the separator characters;
/// no escaping exists, so such text mis-parses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoadmapRecord {
    /// Topic whose children this record declares
    pub label: String,
    /// Child labels in model order, trimmed, empty items kept
    pub children: Vec<String>,
}

impl RoadmapRecord {
    /// Create record from parts
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>, children: Vec<String>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    /// Parse one line
    ///
    /// The label is everything before the first separator, trimmed.
    ///
    /// # Errors
    /// Returns [`RecordError::MissingSeparator`] if the line has no separator.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let (label, rest) = line
            .split_once(LABEL_SEPARATOR)
            .ok_or_else(|| RecordError::MissingSeparator(line.to_string()))?;

        let children = rest
            .trim()
            .split(CHILD_DELIMITER)
            .map(|child| child.trim().to_string())
            .collect();

        Ok(Self::new(label.trim(), children))
    }
}

impl FromStr for RoadmapRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for RoadmapRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.children.join(" | "))
    }
}

/// Record parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Line has no label separator
    #[error("record has no ':' separator: {0:?}")]
    MissingSeparator(String),
}

/// Buffers fragments until newlines close complete records
///
/// Records are released in arrival order; the tree is built breadth-first
/// from that order, so it must never be permuted.
#[derive(Debug, Clone, Default)]
pub struct RecordAssembler {
    pending: String,
    dropped: usize,
}

impl RecordAssembler {
    /// Create empty assembler
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, returning every record it closes
    pub fn push(&mut self, fragment: &str) -> Vec<RoadmapRecord> {
        // `pending` never holds a newline between calls
        let closes_line = fragment.contains('\n');
        self.pending.push_str(fragment);
        if !closes_line {
            return Vec::new();
        }

        let buffered = std::mem::take(&mut self.pending);
        let mut lines: Vec<&str> = buffered.split('\n').collect();
        // the final segment is still open
        self.pending = lines.pop().unwrap_or_default().to_string();

        lines
            .into_iter()
            .filter_map(|line| self.accept(line))
            .collect()
    }

    /// Text received since the last newline
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Number of non-blank lines discarded as malformed so far
    #[inline]
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Close the stream, offering the unterminated last line as a record
    ///
    /// Only meaningful after a clean end of stream; an aborted stream's
    /// remainder may be cut mid-label and should be discarded instead.
    pub fn finish(mut self) -> Option<RoadmapRecord> {
        let last = std::mem::take(&mut self.pending);
        self.accept(&last)
    }

    fn accept(&mut self, line: &str) -> Option<RoadmapRecord> {
        if line.trim().is_empty() {
            return None;
        }
        match RoadmapRecord::parse(line) {
            Ok(record) => Some(record),
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(error = %e, "dropping malformed roadmap record");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(label: &str, children: &[&str]) -> RoadmapRecord {
        RoadmapRecord::new(label, children.iter().map(|c| (*c).to_string()).collect())
    }

    #[test]
    fn parse_basic_record() {
        let parsed = RoadmapRecord::parse("A: B | C").unwrap();
        assert_eq!(parsed, record("A", &["B", "C"]));
    }

    #[test]
    fn parse_splits_on_first_separator_only() {
        let parsed = RoadmapRecord::parse("Time: 10:30 | Noon").unwrap();
        assert_eq!(parsed, record("Time", &["10:30", "Noon"]));
    }

    #[test]
    fn parse_preserves_empty_items() {
        let parsed = RoadmapRecord::parse("A: B || C |").unwrap();
        assert_eq!(parsed, record("A", &["B", "", "C", ""]));

        let bare = RoadmapRecord::parse("A:").unwrap();
        assert_eq!(bare, record("A", &[""]));
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let result = RoadmapRecord::parse("just some prose");
        assert!(matches!(result, Err(RecordError::MissingSeparator(_))));
    }

    #[test]
    fn display_matches_grammar() {
        assert_eq!(record("A", &["B", "C"]).to_string(), "A: B | C");
    }

    #[test]
    fn assembler_defers_open_line() {
        let mut assembler = RecordAssembler::new();
        assert!(assembler.push("A: B").is_empty());
        assert!(assembler.push(" | C").is_empty());
        assert_eq!(assembler.push("\nB: D"), vec![record("A", &["B", "C"])]);
        assert_eq!(assembler.pending(), "B: D");
    }

    #[test]
    fn assembler_emits_several_records_in_order() {
        let mut assembler = RecordAssembler::new();
        let records = assembler.push("A: B | C\nB: D | E\nC: F\n");
        assert_eq!(
            records,
            vec![
                record("A", &["B", "C"]),
                record("B", &["D", "E"]),
                record("C", &["F"]),
            ]
        );
        assert_eq!(assembler.pending(), "");
    }

    #[test]
    fn assembler_skips_blank_and_malformed_lines() {
        let mut assembler = RecordAssembler::new();
        let records = assembler.push("Here is your outline\n\nA: B\n  \n");
        assert_eq!(records, vec![record("A", &["B"])]);
        assert_eq!(assembler.dropped(), 1);
    }

    #[test]
    fn long_line_fed_char_by_char_closes_once() {
        let mut assembler = RecordAssembler::new();
        let children: Vec<String> = (0..500).map(|i| format!("Child {i}")).collect();
        let line = format!("Root: {}", children.join(" | "));

        for c in line.chars() {
            assert!(assembler.push(&c.to_string()).is_empty());
        }
        assert_eq!(assembler.pending(), line);

        let records = assembler.push("\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].children.len(), 500);
        assert_eq!(assembler.pending(), "");
    }

    #[test]
    fn finish_offers_trailing_record() {
        let mut assembler = RecordAssembler::new();
        assert_eq!(assembler.push("A: B\nB: C").len(), 1);
        assert_eq!(assembler.finish(), Some(record("B", &["C"])));
    }

    #[test]
    fn finish_drops_malformed_or_blank_remainder() {
        let mut assembler = RecordAssembler::new();
        assembler.push("A: B\nno separator");
        assert_eq!(assembler.finish(), None);

        let empty = RecordAssembler::new();
        assert_eq!(empty.finish(), None);
    }
}
