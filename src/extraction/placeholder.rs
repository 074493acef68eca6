//! Placeholder grammar: `<|TYPE_n|>` with an optional `<|C_xxx|>` case marker.
//!
//! TYPE is one of PER, LOC, ORG, DATETIME; n is a positive index.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::elements::ElementKind;
use crate::error::Result;
use crate::markup::{merge_identical_runs, Markup, MarkupBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlaceholderKind {
    #[serde(rename = "PER")]
    Per,
    #[serde(rename = "LOC")]
    Loc,
    #[serde(rename = "ORG")]
    Org,
    #[serde(rename = "DATETIME")]
    Datetime,
}

impl PlaceholderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderKind::Per => "PER",
            PlaceholderKind::Loc => "LOC",
            PlaceholderKind::Org => "ORG",
            PlaceholderKind::Datetime => "DATETIME",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PER" => Some(Self::Per),
            "LOC" => Some(Self::Loc),
            "ORG" => Some(Self::Org),
            "DATETIME" => Some(Self::Datetime),
            _ => None,
        }
    }

    pub fn element_kind(&self) -> Option<ElementKind> {
        match self {
            PlaceholderKind::Per => Some(ElementKind::Person),
            PlaceholderKind::Loc => Some(ElementKind::Location),
            PlaceholderKind::Org => Some(ElementKind::Organization),
            PlaceholderKind::Datetime => None,
        }
    }
}

impl From<ElementKind> for PlaceholderKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Person => PlaceholderKind::Per,
            ElementKind::Location => PlaceholderKind::Loc,
            ElementKind::Organization => PlaceholderKind::Org,
        }
    }
}

/// Parsed placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
}

impl Placeholder {
    pub fn new(kind: PlaceholderKind, index: usize) -> Self {
        Self {
            kind,
            index,
            case: None,
        }
    }

    pub fn with_case(mut self, case: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self
    }

    /// Parse a whole string as one placeholder.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = pattern().captures(text)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != text.len() {
            return None;
        }
        Self::from_captures(&caps)
    }

    fn from_captures(caps: &regex::Captures<'_>) -> Option<Self> {
        Some(Self {
            kind: PlaceholderKind::from_tag(caps.get(1)?.as_str())?,
            index: caps.get(2)?.as_str().parse().ok()?,
            case: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<|{}_{}|>", self.kind.as_str(), self.index)?;
        if let Some(case) = &self.case {
            write!(f, "<|C_{}|>", case)?;
        }
        Ok(())
    }
}

/// Next free placeholder index per kind, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct IndexCounter {
    next: BTreeMap<PlaceholderKind, usize>,
}

impl IndexCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, kind: PlaceholderKind) -> usize {
        let slot = self.next.entry(kind).or_insert(1);
        let index = *slot;
        *slot += 1;
        index
    }

    pub fn peek(&self, kind: PlaceholderKind) -> usize {
        self.next.get(&kind).copied().unwrap_or(1)
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<\|(PER|LOC|ORG|DATETIME)_(\d+)\|>(?:<\|C_(\w+)\|>)?").unwrap()
    })
}

/// Any `<|...|>` token, including special tokens from the fixed-phrase table.
fn any_special() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<\|[^|]*\|>").unwrap())
}

pub fn is_placeholder(text: &str) -> bool {
    Placeholder::parse(text).is_some()
}

/// Whether `text` is entirely made of `<|...|>` tokens.
pub fn is_special_token(text: &str) -> bool {
    !text.is_empty() && any_special().replace_all(text, "").trim().is_empty()
}

/// Every placeholder in `text` with its byte range.
pub fn find_all(text: &str) -> Vec<(std::ops::Range<usize>, Placeholder)> {
    pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.range(), Placeholder::from_captures(&caps)?))
        })
        .collect()
}

/// Byte ranges covered by any `<|...|>` token.
pub fn special_ranges(text: &str) -> Vec<std::ops::Range<usize>> {
    any_special().find_iter(text).map(|m| m.range()).collect()
}

/// Rewrite placeholder indices of one kind through `mapping`. Indices with
/// no mapping are left alone.
pub fn remap(text: &str, kind: PlaceholderKind, mapping: &BTreeMap<usize, usize>) -> String {
    pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| match Placeholder::from_captures(caps) {
            Some(mut ph) if ph.kind == kind => {
                if let Some(new_index) = mapping.get(&ph.index) {
                    ph.index = *new_index;
                }
                ph.to_string()
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Rewrite placeholder indices in every token of a sentence.
pub fn remap_markup(markup: &Markup, kind: PlaceholderKind, mapping: &BTreeMap<usize, usize>) -> Markup {
    markup.with_tokens(
        markup
            .iter()
            .map(|t| t.relabeled(remap(&t.text, kind, mapping)))
            .collect(),
    )
}

/// Collapse runs of the same placeholder in every sentence. Passage text is
/// rendered from tokens, so this also merges placeholders that are separated
/// only by whitespace in the text.
pub fn merge_adjacent_block(block: &MarkupBlock) -> Result<MarkupBlock> {
    block.try_map(|m| merge_identical_runs(m, is_placeholder))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Token;

    #[test]
    fn test_parse_and_display() {
        let ph = Placeholder::parse("<|PER_12|>").unwrap();
        assert_eq!(ph, Placeholder::new(PlaceholderKind::Per, 12));
        let cased = Placeholder::parse("<|LOC_1|><|C_Loc|>").unwrap();
        assert_eq!(cased.case.as_deref(), Some("Loc"));
        assert_eq!(cased.to_string(), "<|LOC_1|><|C_Loc|>");
        assert!(Placeholder::parse("x<|PER_1|>").is_none());
        assert!(Placeholder::parse("<|QUOTE_ST|>").is_none());
        assert!(is_special_token("<|QUOTE_ST|>"));
        assert!(!is_special_token("Анна"));
    }

    #[test]
    fn test_counter_per_kind() {
        let mut counter = IndexCounter::new();
        assert_eq!(counter.next(PlaceholderKind::Datetime), 1);
        assert_eq!(counter.next(PlaceholderKind::Datetime), 2);
        assert_eq!(counter.next(PlaceholderKind::Per), 1);
        assert_eq!(counter.peek(PlaceholderKind::Datetime), 3);
    }

    #[test]
    fn test_remap_only_touches_kind() {
        let mapping = BTreeMap::from([(1, 2), (2, 1)]);
        let out = remap("<|PER_1|> и <|PER_2|> в <|LOC_1|>", PlaceholderKind::Per, &mapping);
        assert_eq!(out, "<|PER_2|> и <|PER_1|> в <|LOC_1|>");
    }

    #[test]
    fn test_merge_adjacent_block_idempotent() {
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 4, "nsubj", "<|PER_1|>", "PROPN"),
            Token::new(2, 1, "conj", "<|PER_1|>", "PROPN"),
            Token::new(3, 1, "conj", "<|PER_1|>", "PROPN"),
            Token::new(4, 0, "root", "встретил", "VERB"),
            Token::new(5, 4, "obj", "<|PER_2|>", "PROPN"),
            Token::new(6, 7, "cc", "и", "CCONJ"),
            Token::new(7, 5, "conj", "<|PER_2|>", "PROPN"),
        ])]);
        let once = merge_adjacent_block(&block).unwrap();
        assert_eq!(once.text(), "<|PER_1|> встретил <|PER_2|> и <|PER_2|>");
        once.validate().unwrap();
        assert_eq!(merge_adjacent_block(&once).unwrap(), once);
    }

    #[test]
    fn test_find_all_ranges() {
        let text = "в <|DATETIME_3|> пришёл <|ORG_1|>";
        let found = find_all(text);
        assert_eq!(found.len(), 2);
        assert_eq!(&text[found[0].0.clone()], "<|DATETIME_3|>");
        assert_eq!(found[1].1.kind, PlaceholderKind::Org);
    }
}
