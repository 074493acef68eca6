//! Linguistic annotators consumed by the preprocessor.
//!
//! Statistical taggers and parsers live outside this crate. They plug in
//! through the traits below:
//!
//! - [`Segmenter`] - text → sentences of token strings
//! - [`MorphTagger`] - tokens → POS and morphological features
//! - [`SyntaxParser`] - tokens → dependency heads and relations
//! - [`NerTagger`] - text → typed entity spans
//! - [`DateParser`] - text → date phrase spans
//!
//! [`UnicodeSegmenter`] is a usable default segmenter. [`PrecomputedAnnotations`]
//! replays annotations computed elsewhere (by a host process, or by hand in
//! tests) and implements every trait.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::elements::{ElementKind, PartialDateTime};
use crate::error::{PreprocessError, Result};
use crate::markup::{MorphToken, SyntaxToken};

// =============================================================================
// Traits
// =============================================================================

pub trait Segmenter {
    fn segment(&self, text: &str) -> Result<Vec<Vec<String>>>;
}

pub trait MorphTagger {
    fn tag(&self, tokens: &[String]) -> Result<Vec<MorphToken>>;
}

pub trait SyntaxParser {
    fn parse(&self, tokens: &[String]) -> Result<Vec<SyntaxToken>>;
}

/// Typed entity span. Offsets are byte offsets into the text passed to the
/// tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerSpan {
    pub start: usize,
    pub end: usize,
    pub kind: ElementKind,
    /// Canonical (lemmatized) form of the mention.
    pub normal: String,
}

pub trait NerTagger {
    fn recognize(&self, text: &str) -> Result<Vec<NerSpan>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: usize,
    pub end: usize,
    pub value: PartialDateTime,
}

pub trait DateParser {
    fn parse_dates(&self, text: &str, reference: Option<&PartialDateTime>) -> Result<Vec<DateSpan>>;
}

/// The annotator set used for one `process` call.
pub struct Annotators {
    pub segmenter: Box<dyn Segmenter>,
    pub morph: Box<dyn MorphTagger>,
    pub syntax: Box<dyn SyntaxParser>,
    pub ner: Option<Box<dyn NerTagger>>,
    pub dates: Option<Box<dyn DateParser>>,
}

impl Annotators {
    /// Every role served by one set of precomputed annotations.
    pub fn precomputed(annotations: PrecomputedAnnotations) -> Self {
        Self {
            segmenter: Box::new(annotations.clone()),
            morph: Box::new(annotations.clone()),
            syntax: Box::new(annotations.clone()),
            ner: Some(Box::new(annotations.clone())),
            dates: Some(Box::new(annotations)),
        }
    }
}

// =============================================================================
// UnicodeSegmenter
// =============================================================================

/// UAX #29 sentence and word segmentation. Whitespace is dropped; punctuation
/// becomes its own token.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSegmenter;

impl Segmenter for UnicodeSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Vec<String>>> {
        Ok(text
            .unicode_sentences()
            .map(|sentence| {
                sentence
                    .split_word_bounds()
                    .filter(|w| !w.trim().is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|tokens| !tokens.is_empty())
            .collect())
    }
}

// =============================================================================
// PrecomputedAnnotations
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub morph: Vec<MorphToken>,
    pub syntax: Vec<SyntaxToken>,
}

impl AnnotatedSentence {
    fn texts(&self) -> impl Iterator<Item = &str> {
        self.syntax.iter().map(|t| t.text.as_str())
    }
}

/// Entity mention located by its surface text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHint {
    pub text: String,
    pub kind: ElementKind,
    #[serde(default)]
    pub normal: Option<String>,
}

/// Date phrase located by its surface text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateHint {
    pub text: String,
    pub value: PartialDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedAnnotations {
    pub sentences: Vec<AnnotatedSentence>,
    #[serde(default)]
    pub entities: Vec<EntityHint>,
    #[serde(default)]
    pub dates: Vec<DateHint>,
}

impl PrecomputedAnnotations {
    fn sentence_for(&self, tokens: &[String]) -> Result<&AnnotatedSentence> {
        self.sentences
            .iter()
            .find(|s| s.texts().eq(tokens.iter().map(String::as_str)))
            .ok_or_else(|| {
                PreprocessError::Annotator(format!("no annotation for sentence {:?}", tokens.join(" ")))
            })
    }
}

/// Byte ranges of every non-overlapping occurrence of `needle`.
fn occurrences<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    haystack
        .match_indices(needle)
        .filter(move |_| !needle.is_empty())
        .map(move |(start, _)| (start, start + needle.len()))
}

impl Segmenter for PrecomputedAnnotations {
    fn segment(&self, _text: &str) -> Result<Vec<Vec<String>>> {
        Ok(self
            .sentences
            .iter()
            .map(|s| s.texts().map(str::to_string).collect())
            .collect())
    }
}

impl MorphTagger for PrecomputedAnnotations {
    fn tag(&self, tokens: &[String]) -> Result<Vec<MorphToken>> {
        Ok(self.sentence_for(tokens)?.morph.clone())
    }
}

impl SyntaxParser for PrecomputedAnnotations {
    fn parse(&self, tokens: &[String]) -> Result<Vec<SyntaxToken>> {
        Ok(self.sentence_for(tokens)?.syntax.clone())
    }
}

impl NerTagger for PrecomputedAnnotations {
    fn recognize(&self, text: &str) -> Result<Vec<NerSpan>> {
        let mut spans: Vec<NerSpan> = self
            .entities
            .iter()
            .flat_map(|hint| {
                occurrences(text, &hint.text).map(move |(start, end)| NerSpan {
                    start,
                    end,
                    kind: hint.kind,
                    normal: hint.normal.clone().unwrap_or_else(|| hint.text.clone()),
                })
            })
            .collect();
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }
}

impl DateParser for PrecomputedAnnotations {
    fn parse_dates(&self, text: &str, _reference: Option<&PartialDateTime>) -> Result<Vec<DateSpan>> {
        let mut spans: Vec<DateSpan> = self
            .dates
            .iter()
            .flat_map(|hint| {
                occurrences(text, &hint.text).map(move |(start, end)| DateSpan {
                    start,
                    end,
                    value: hint.value.clone(),
                })
            })
            .collect();
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }
}

// =============================================================================
// Tests
// =============================================================================
