//! Span collapse: replace a contiguous token run with one placeholder node.
//!
//! The surviving node takes the role of the run's entry point (the member
//! governed from outside the run), so the rest of the tree keeps a valid
//! attachment. Dependents of removed members are re-hung on the survivor.
//!
//! ```text
//!   1 Анна(→3)  2 Сергеевна(→1)  3 сказала(root)
//!   collapse positions 0..2 as <|PER_1|>
//!   1 <|PER_1|>(→2)  2 сказала(root)
//! ```

use std::collections::HashSet;
use std::ops::Range;

use super::block::{Markup, MarkupBlock};
use super::token::{renumber, Token, TokenId, ROOT_HEAD};
use crate::error::{PreprocessError, Result};

/// Tokens stripped from both ends of a run before collapsing.
pub const TRIM_PUNCT: [&str; 3] = [",", "-", "—"];

/// Text comparison used when locating a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCase {
    Sensitive,
    Insensitive,
}

impl MatchCase {
    fn normalize(&self, text: &str) -> String {
        let squeezed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match self {
            MatchCase::Sensitive => squeezed,
            MatchCase::Insensitive => squeezed.to_lowercase(),
        }
    }
}

/// Position range of the first token run whose concatenated text equals
/// `phrase` (whitespace ignored on both sides).
pub fn find_run(markup: &Markup, phrase: &str, case: MatchCase) -> Option<Range<usize>> {
    let target = case.normalize(phrase);
    if target.is_empty() {
        return None;
    }
    let texts: Vec<String> = markup.iter().map(|t| case.normalize(&t.text)).collect();

    for start in 0..texts.len() {
        let mut acc = String::new();
        for (end, text) in texts.iter().enumerate().skip(start) {
            acc.push_str(text);
            if acc == target {
                return Some(start..end + 1);
            }
            if !target.starts_with(acc.as_str()) {
                break;
            }
        }
    }
    None
}

/// Shrink a run past leading and trailing separator punctuation.
pub fn trim_run(markup: &Markup, range: Range<usize>) -> Range<usize> {
    let tokens = markup.tokens();
    let is_trim = |pos: usize| TRIM_PUNCT.contains(&tokens[pos].text.as_str());
    let (mut start, mut end) = (range.start, range.end.min(tokens.len()));
    while start < end && is_trim(start) {
        start += 1;
    }
    while end > start && is_trim(end - 1) {
        end -= 1;
    }
    start..end
}

/// Collapse the tokens at `range` into one token with `text`.
///
/// Returns `Ok(None)` when nothing is left after trimming separators.
pub fn collapse_run(markup: &Markup, range: Range<usize>, text: &str) -> Result<Option<Markup>> {
    let range = trim_run(markup, range);
    if range.is_empty() {
        return Ok(None);
    }
    let tokens = markup.tokens();
    let members: HashSet<TokenId> = tokens[range.clone()].iter().map(|t| t.id).collect();

    let entry = tokens[range.clone()]
        .iter()
        .find(|t| t.is_root())
        .or_else(|| tokens[range.clone()].iter().find(|t| !members.contains(&t.head_id)))
        .unwrap_or(&tokens[range.start]);

    let mut replacement = entry.relabeled(text);
    if members.contains(&replacement.head_id) {
        replacement.head_id = ROOT_HEAD;
    }

    let reattach = |token: &Token| -> Token {
        let mut token = token.clone();
        if members.contains(&token.head_id) {
            token.head_id = entry.id;
        }
        token
    };

    let mut edited: Vec<Token> = Vec::with_capacity(tokens.len() - range.len() + 1);
    edited.extend(tokens[..range.start].iter().map(&reattach));
    edited.push(replacement);
    edited.extend(tokens[range.end..].iter().map(&reattach));

    let expected = tokens.len() - (range.len() - 1);
    if edited.len() != expected {
        return Err(PreprocessError::consistency(
            "collapse",
            format!("expected {} tokens, produced {}", expected, edited.len()),
        ));
    }
    Ok(Some(markup.with_tokens(renumber(edited))))
}

/// Locate `phrase` and collapse it. `Ok(None)` when the phrase is absent.
pub fn collapse_phrase(
    markup: &Markup,
    phrase: &str,
    text: &str,
    case: MatchCase,
) -> Result<Option<Markup>> {
    match find_run(markup, phrase, case) {
        Some(range) => collapse_run(markup, range, text),
        None => Ok(None),
    }
}

/// Collapse the first occurrence of `phrase` in any sentence of a block.
/// `Ok(None)` when no sentence contains it.
pub fn collapse_phrase_in_block(
    block: &MarkupBlock,
    phrase: &str,
    text: &str,
    case: MatchCase,
) -> Result<Option<MarkupBlock>> {
    for (idx, markup) in block.iter().enumerate() {
        if let Some(collapsed) = collapse_phrase(markup, phrase, text, case)? {
            let mut markups = block.markups().to_vec();
            markups[idx] = collapsed;
            return Ok(Some(MarkupBlock::new(markups)));
        }
    }
    Ok(None)
}

/// Collapse every maximal run of adjacent tokens that share the same text
/// and satisfy `mergeable`. Applying it twice changes nothing.
pub fn merge_identical_runs<F>(markup: &Markup, mergeable: F) -> Result<Markup>
where
    F: Fn(&str) -> bool,
{
    let mut current = markup.clone();
    let mut pos = 0;
    while pos < current.len() {
        let text = current.tokens()[pos].text.clone();
        let mut end = pos + 1;
        if mergeable(&text) {
            while end < current.len() && current.tokens()[end].text == text {
                end += 1;
            }
        }
        if end - pos > 1 {
            if let Some(next) = collapse_run(&current, pos..end, &text)? {
                current = next;
            }
        }
        pos += 1;
    }
    Ok(current)
}

// =============================================================================
// Tests
// =============================================================================
