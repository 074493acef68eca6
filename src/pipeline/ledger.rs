//! Batch bookkeeping: failed paragraphs and already-processed sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::error::{ErrorKind, PreprocessError, Result};

// =============================================================================
// ErrorLedger
// =============================================================================

/// One failed paragraph (or a whole source when `paragraph` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source: String,
    pub paragraph: Option<usize>,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// `timestamp | source | paragraph | kind: message`
    pub fn to_line(&self) -> String {
        let paragraph = self
            .paragraph
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        format!(
            "{} | {} | {} | {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            paragraph,
            self.kind.as_str(),
            self.message
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorLedger {
    entries: Vec<LedgerEntry>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &str, paragraph: Option<usize>, error: &PreprocessError) {
        self.entries.push(LedgerEntry {
            source: source.to_string(),
            paragraph,
            kind: error.kind(),
            message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_source<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        self.entries.iter().filter(move |e| e.source == source)
    }

    pub fn to_lines(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_line() + "\n")
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// ProcessedLedger
// =============================================================================

/// Content hash of a source as hex (u64 would overflow JS numbers).
pub fn content_hash(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Content-addressed record of finished sources, for resumable runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedLedger {
    hashes: BTreeSet<String>,
    check_count: u64,
    skip_count: u64,
}

impl ProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from hashes written by [`ProcessedLedger::to_lines`].
    pub fn from_lines(lines: &str) -> Self {
        Self {
            hashes: lines
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            ..Default::default()
        }
    }

    /// True if `text` was already processed. Counts toward the skip rate.
    pub fn check(&mut self, text: &str) -> bool {
        self.check_count += 1;
        let seen = self.contains(text);
        if seen {
            self.skip_count += 1;
        }
        seen
    }

    pub fn contains(&self, text: &str) -> bool {
        self.hashes.contains(&content_hash(text))
    }

    /// Mark `text` as processed; returns its hash.
    pub fn record(&mut self, text: &str) -> String {
        let hash = content_hash(text);
        self.hashes.insert(hash.clone());
        hash
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Skip rate as percentage
    pub fn skip_rate(&self) -> f64 {
        if self.check_count == 0 {
            return 0.0;
        }
        (self.skip_count as f64 / self.check_count as f64) * 100.0
    }

    pub fn to_lines(&self) -> String {
        self.hashes.iter().map(|h| format!("{}\n", h)).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_ledger_records_kind_and_position() {
        let mut ledger = ErrorLedger::new();
        ledger.record("a.txt", Some(3), &PreprocessError::consistency("rearrange", "lost a token"));
        ledger.record("b.txt", None, &PreprocessError::Annotator("parser down".into()));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.for_source("a.txt").count(), 1);
        let line = ledger.entries()[0].to_line();
        assert!(line.contains("| a.txt | 3 | consistency_violation:"));
        assert!(ledger.entries()[1].to_line().contains("| b.txt | - |"));
        assert_eq!(ledger.to_lines().lines().count(), 2);

        let json = ledger.to_json().unwrap();
        let back: Vec<LedgerEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger.entries());
    }

    #[test]
    fn test_processed_ledger_skips_seen_content() {
        let mut ledger = ProcessedLedger::new();
        assert!(!ledger.check("Глава первая"));
        let hash = ledger.record("Глава первая");
        assert_eq!(hash, content_hash("Глава первая"));
        assert!(ledger.check("Глава первая"));
        assert!(!ledger.check("Глава вторая"));
        assert!((ledger.skip_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_processed_ledger_resume() {
        let mut ledger = ProcessedLedger::new();
        ledger.record("один");
        ledger.record("два");
        let resumed = ProcessedLedger::from_lines(&ledger.to_lines());
        assert_eq!(resumed.len(), 2);
        assert!(resumed.contains("два"));
    }
}
