//! Token: one node of a sentence dependency tree.
//!
//! Tokens are plain data. Structural invariants (contiguous ids, heads that
//! resolve inside the sentence, no cycles) belong to [`super::Markup`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 1-based token id within a sentence. Head id 0 marks a root.
pub type TokenId = usize;

/// Head id carried by root tokens.
pub const ROOT_HEAD: TokenId = 0;

/// Punctuation glued to the preceding token in text projection.
pub const GLUED_PUNCT: [&str; 6] = [".", ",", "!", "?", ";", ":"];

/// Morphological feature map (`Case=Nom`, `Tense=Past`, ...).
pub type Feats = BTreeMap<String, String>;

// =============================================================================
// Token
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub head_id: TokenId,
    pub rel: String,
    pub text: String,
    pub pos: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feats: Feats,
}

impl Token {
    pub fn new(
        id: TokenId,
        head_id: TokenId,
        rel: impl Into<String>,
        text: impl Into<String>,
        pos: impl Into<String>,
    ) -> Self {
        Self {
            id,
            head_id,
            rel: rel.into(),
            text: text.into(),
            pos: pos.into(),
            feats: Feats::new(),
        }
    }

    /// Builder-style feature setter, mostly for fixtures.
    pub fn with_feat(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.feats.insert(key.into(), value.into());
        self
    }

    pub fn feat(&self, key: &str) -> Option<&str> {
        self.feats.get(key).map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.head_id == ROOT_HEAD
    }

    pub fn is_glued_punct(&self) -> bool {
        GLUED_PUNCT.contains(&self.text.as_str())
    }

    /// Copy of this token with a different surface text. Keeps role and
    /// features, which is what a placeholder replacement needs.
    pub fn relabeled(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

// =============================================================================
// Aligned annotator output
// =============================================================================

/// One token of morphological tagger output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphToken {
    pub text: String,
    pub pos: String,
    #[serde(default)]
    pub feats: Feats,
}

impl MorphToken {
    pub fn new(text: impl Into<String>, pos: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: pos.into(),
            feats: Feats::new(),
        }
    }

    pub fn with_feat(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.feats.insert(key.into(), value.into());
        self
    }
}

/// One token of syntax parser output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxToken {
    pub id: TokenId,
    pub head_id: TokenId,
    pub rel: String,
    pub text: String,
}

impl SyntaxToken {
    pub fn new(id: TokenId, head_id: TokenId, rel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            head_id,
            rel: rel.into(),
            text: text.into(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Join token texts with spaces, gluing punctuation to its predecessor.
/// Returns the joined text and the byte span of every token.
pub fn join_with_spans<'a, I>(texts: I) -> (String, Vec<(usize, usize)>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    let mut spans = Vec::new();
    for text in texts {
        if !out.is_empty() && !GLUED_PUNCT.contains(&text) {
            out.push(' ');
        }
        let start = out.len();
        out.push_str(text);
        spans.push((start, out.len()));
    }
    (out, spans)
}

/// Assign ids 1..N in the given order and translate heads through the
/// old→new mapping. Heads that no longer resolve become roots.
pub fn renumber(tokens: Vec<Token>) -> Vec<Token> {
    let mapping: HashMap<TokenId, TokenId> = tokens
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.id, idx + 1))
        .collect();

    tokens
        .into_iter()
        .enumerate()
        .map(|(idx, mut token)| {
            token.id = idx + 1;
            token.head_id = mapping.get(&token.head_id).copied().unwrap_or(ROOT_HEAD);
            token
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
