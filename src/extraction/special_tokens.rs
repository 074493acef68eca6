//! Fixed-phrase table: screenplay jargon ("за кадром", "cut to") becomes one
//! special token, collapsed like any other span.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::markup::{collapse_phrase_in_block, MatchCase, MarkupBlock};

#[derive(Debug, Clone, Default)]
pub struct FixedPhraseTable {
    /// (lowercase phrase, token), longest phrase first
    entries: Vec<(String, String)>,
}

impl FixedPhraseTable {
    pub fn new(phrases: &BTreeMap<String, String>) -> Self {
        Self::from_records(phrases.iter().map(|(p, t)| (p.as_str(), t.as_str())))
    }

    /// Build from (phrase, token) pairs. Blank phrases are ignored.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<(String, String)> = records
            .into_iter()
            .map(|(phrase, token)| (phrase.trim().to_lowercase(), token.trim().to_string()))
            .filter(|(phrase, token)| {
                !phrase.is_empty() && !token.is_empty() && *phrase != token.to_lowercase()
            })
            .collect();
        entries.sort_by(|a, b| {
            let words = |s: &str| s.split_whitespace().count();
            words(&b.0).cmp(&words(&a.0)).then_with(|| a.0.cmp(&b.0))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of every phrase.
    pub fn apply(&self, block: &MarkupBlock) -> Result<(MarkupBlock, usize)> {
        let mut block = block.clone();
        let mut replaced = 0;
        for (phrase, token) in &self.entries {
            while let Some(next) = collapse_phrase_in_block(&block, phrase, token, MatchCase::Insensitive)? {
                block = next;
                replaced += 1;
            }
        }
        if replaced > 0 {
            debug!(replaced, "fixed phrases collapsed");
        }
        Ok((block, replaced))
    }
}
