//! Markup and MarkupBlock: sentence trees and passages.
//!
//! A `Markup` is an immutable snapshot of one sentence. Every structural
//! stage consumes a snapshot and returns a new one, so the child index is
//! built once at construction and never goes stale.
//!
//! # Invariants checked by [`Markup::validate`]
//! - ids are exactly `1..=N` in order
//! - every head is 0 or an id in the same sentence
//! - following heads from any token reaches a root (no cycles)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::token::{join_with_spans, MorphToken, SyntaxToken, Token, TokenId, ROOT_HEAD};
use crate::error::{PreprocessError, Result};

// =============================================================================
// Event Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    #[default]
    Unknown,
    Static,
    Dynamic,
    Mixed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Unknown => "UNKNOWN",
            EventType::Static => "STATIC",
            EventType::Dynamic => "DYNAMIC",
            EventType::Mixed => "MIXED",
        }
    }
}

// =============================================================================
// Markup
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarkupRepr {
    tokens: Vec<Token>,
    #[serde(default)]
    event_type: EventType,
}

impl From<MarkupRepr> for Markup {
    fn from(repr: MarkupRepr) -> Self {
        Markup::new(repr.tokens).with_event_type(repr.event_type)
    }
}

/// Dependency-annotated token sequence for one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "MarkupRepr")]
pub struct Markup {
    tokens: Vec<Token>,
    event_type: EventType,
    #[serde(skip)]
    children: HashMap<TokenId, Vec<TokenId>>,
}

impl PartialEq for Markup {
    fn eq(&self, other: &Self) -> bool {
        self.tokens == other.tokens && self.event_type == other.event_type
    }
}

impl Markup {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut children: HashMap<TokenId, Vec<TokenId>> = HashMap::new();
        for token in &tokens {
            if token.head_id != token.id {
                children.entry(token.head_id).or_default().push(token.id);
            }
        }
        Self {
            tokens,
            event_type: EventType::Unknown,
            children,
        }
    }

    /// Build a sentence from aligned tagger and parser output.
    pub fn from_annotations(morph: &[MorphToken], syntax: &[SyntaxToken]) -> Result<Self> {
        if morph.len() != syntax.len() {
            return Err(PreprocessError::mismatch(
                "token count",
                morph.len(),
                syntax.len(),
            ));
        }

        let mut tokens = Vec::with_capacity(morph.len());
        for (m, s) in morph.iter().zip(syntax) {
            if m.text != s.text {
                return Err(PreprocessError::mismatch("token text", &m.text, &s.text));
            }
            tokens.push(Token {
                id: s.id,
                head_id: s.head_id,
                rel: s.rel.clone(),
                text: s.text.clone(),
                pos: m.pos.clone(),
                feats: m.feats.clone(),
            });
        }
        Ok(Self::new(tokens))
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// New snapshot with the given tokens and this sentence's event type.
    pub fn with_tokens(&self, tokens: Vec<Token>) -> Self {
        Self::new(tokens).with_event_type(self.event_type)
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.position(id).map(|pos| &self.tokens[pos])
    }

    /// Index of the token with this id.
    pub fn position(&self, id: TokenId) -> Option<usize> {
        // Fast path: renumbered sentences keep id == position + 1.
        if id >= 1 && self.tokens.get(id - 1).map(|t| t.id) == Some(id) {
            return Some(id - 1);
        }
        self.tokens.iter().position(|t| t.id == id)
    }

    /// Direct dependents of `id`, in sentence order.
    pub fn children(&self, id: TokenId) -> &[TokenId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dependents of `id` with the given relation.
    pub fn children_with_rel<'a>(&'a self, id: TokenId, rel: &'a str) -> impl Iterator<Item = &'a Token> + 'a {
        self.children(id)
            .iter()
            .filter_map(move |child| self.get(*child))
            .filter(move |t| t.rel == rel)
    }

    /// First token attached to the virtual root.
    pub fn root(&self) -> Option<&Token> {
        self.tokens.iter().find(|t| t.is_root())
    }

    /// Ids of the token and all its descendants, in sentence order.
    pub fn subtree(&self, id: TokenId) -> Vec<TokenId> {
        let mut seen = vec![id];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for &child in self.children(current) {
                if !seen.contains(&child) {
                    seen.push(child);
                    stack.push(child);
                }
            }
        }
        self.tokens
            .iter()
            .map(|t| t.id)
            .filter(|id| seen.contains(id))
            .collect()
    }

    pub fn text(&self) -> String {
        self.project().0
    }

    /// Linear text plus the byte span of every token.
    pub fn project(&self) -> (String, Vec<(usize, usize)>) {
        join_with_spans(self.tokens.iter().map(|t| t.text.as_str()))
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, token) in self.tokens.iter().enumerate() {
            if token.id != idx + 1 {
                return Err(PreprocessError::consistency(
                    "validate",
                    format!("token at position {} has id {}", idx + 1, token.id),
                ));
            }
            if token.head_id != ROOT_HEAD && token.head_id > self.tokens.len() {
                return Err(PreprocessError::consistency(
                    "validate",
                    format!("token {} points at missing head {}", token.id, token.head_id),
                ));
            }
        }

        // 0 unseen, 1 on the current walk, 2 reaches a root
        let mut state = vec![0u8; self.tokens.len()];
        for token in &self.tokens {
            let mut walk = Vec::new();
            let mut current = token.id;
            while current != ROOT_HEAD && state[current - 1] != 2 {
                if state[current - 1] == 1 {
                    return Err(PreprocessError::consistency(
                        "validate",
                        format!("cycle reachable from token {}", token.id),
                    ));
                }
                state[current - 1] = 1;
                walk.push(current);
                current = self.tokens[current - 1].head_id;
            }
            for id in walk {
                state[id - 1] = 2;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Markup {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

// =============================================================================
// MarkupBlock
// =============================================================================

/// Location of one token inside a block projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub sentence: usize,
    /// Index into the sentence's token list (not the token id).
    pub position: usize,
    pub start: usize,
    pub end: usize,
}

/// Linear text of a passage and where each token landed in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockProjection {
    pub text: String,
    pub spans: Vec<TokenSpan>,
}

impl BlockProjection {
    /// Tokens whose span intersects `[start, end)`.
    pub fn overlapping(&self, start: usize, end: usize) -> impl Iterator<Item = &TokenSpan> + '_ {
        self.spans
            .iter()
            .filter(move |s| s.start < end && start < s.end)
    }
}

/// Ordered sequence of sentences spanning one passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkupBlock {
    markups: Vec<Markup>,
}

impl MarkupBlock {
    pub fn new(markups: Vec<Markup>) -> Self {
        Self { markups }
    }

    /// Build a passage from per-sentence tagger and parser output.
    pub fn from_annotations(morph: &[Vec<MorphToken>], syntax: &[Vec<SyntaxToken>]) -> Result<Self> {
        if morph.len() != syntax.len() {
            return Err(PreprocessError::mismatch(
                "sentence count",
                morph.len(),
                syntax.len(),
            ));
        }
        let markups = morph
            .iter()
            .zip(syntax)
            .map(|(m, s)| Markup::from_annotations(m, s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(markups))
    }

    pub fn markups(&self) -> &[Markup] {
        &self.markups
    }

    pub fn into_markups(self) -> Vec<Markup> {
        self.markups
    }

    pub fn len(&self) -> usize {
        self.markups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Markup> {
        self.markups.iter()
    }

    pub fn token_count(&self) -> usize {
        self.markups.iter().map(Markup::len).sum()
    }

    /// Apply a per-sentence stage, producing a new block.
    pub fn try_map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Markup) -> Result<Markup>,
    {
        let markups = self.markups.iter().map(&mut f).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(markups))
    }

    /// Sentences joined by spaces.
    pub fn text(&self) -> String {
        self.project().text
    }

    /// One sentence per line.
    pub fn lines(&self) -> String {
        self.markups
            .iter()
            .map(Markup::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn project(&self) -> BlockProjection {
        let mut projection = BlockProjection::default();
        for (sentence, markup) in self.markups.iter().enumerate() {
            if sentence > 0 {
                projection.text.push(' ');
            }
            let offset = projection.text.len();
            let (text, spans) = markup.project();
            projection.text.push_str(&text);
            projection
                .spans
                .extend(spans.into_iter().enumerate().map(|(position, (s, e))| TokenSpan {
                    sentence,
                    position,
                    start: offset + s,
                    end: offset + e,
                }));
        }
        projection
    }

    pub fn validate(&self) -> Result<()> {
        self.markups.iter().try_for_each(Markup::validate)
    }
}

impl<'a> IntoIterator for &'a MarkupBlock {
    type Item = &'a Markup;
    type IntoIter = std::slice::Iter<'a, Markup>;

    fn into_iter(self) -> Self::IntoIter {
        self.markups.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
