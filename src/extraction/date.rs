//! Date extraction: literal date patterns, then an external date parser.
//!
//! Both sources draw from one DATETIME counter, so indices in a passage are
//! unique no matter which source found the phrase. Dates are located in the
//! tree case-sensitively and collapsed into `<|DATETIME_n|>` nodes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::annotators::DateParser;
use super::placeholder::{special_ranges, IndexCounter, Placeholder, PlaceholderKind};
use crate::config::GenreProfile;
use crate::elements::PartialDateTime;
use crate::error::{PreprocessError, Result, StageWarning};
use crate::markup::{collapse_phrase_in_block, MatchCase, MarkupBlock};

const STAGE: &str = "dates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Pattern,
    Parser,
}

/// One date phrase replaced in the passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateMention {
    pub index: usize,
    pub placeholder: String,
    pub text: String,
    pub value: PartialDateTime,
    pub source: DateSource,
}

pub struct DateExtractor {
    pattern: Option<Regex>,
}

impl DateExtractor {
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        Ok(Self {
            pattern: pattern.map(Regex::new).transpose()?,
        })
    }

    pub fn from_profile(profile: &GenreProfile) -> Result<Self> {
        Self::new(profile.date_pattern.as_deref())
    }

    /// Replace every recognized date in `block`.
    pub fn extract(
        &self,
        block: &MarkupBlock,
        parser: Option<&dyn DateParser>,
        reference: Option<&PartialDateTime>,
        counter: &mut IndexCounter,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<(MarkupBlock, Vec<DateMention>)> {
        let mut block = block.clone();
        let mut mentions = Vec::new();

        if let Some(pattern) = &self.pattern {
            let text = block.text();
            let literals: Vec<String> = pattern.find_iter(&text).map(|m| m.as_str().to_string()).collect();
            for literal in literals {
                let value = match PartialDateTime::parse_dmy(&literal) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(literal = %literal, "keeping unparseable date literal");
                        warnings.push(StageWarning::from_error(STAGE, &err));
                        continue;
                    }
                };
                if let Some(mention) =
                    self.replace(&mut block, &literal, value, DateSource::Pattern, counter, warnings)?
                {
                    mentions.push(mention);
                }
            }
        }

        if let Some(parser) = parser {
            let text = block.text();
            let taken = special_ranges(&text);
            let spans = parser.parse_dates(&text, reference)?;
            for span in spans {
                if taken.iter().any(|r| r.start < span.end && span.start < r.end) {
                    continue;
                }
                let Some(phrase) = text.get(span.start..span.end) else {
                    warnings.push(StageWarning::from_error(
                        STAGE,
                        &PreprocessError::span_not_found(format!("{}..{}", span.start, span.end)),
                    ));
                    continue;
                };
                if let Some(mention) =
                    self.replace(&mut block, phrase, span.value, DateSource::Parser, counter, warnings)?
                {
                    mentions.push(mention);
                }
            }
        }

        debug!(dates = mentions.len(), "date extraction done");
        Ok((block, mentions))
    }

    fn replace(
        &self,
        block: &mut MarkupBlock,
        phrase: &str,
        value: PartialDateTime,
        source: DateSource,
        counter: &mut IndexCounter,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<Option<DateMention>> {
        let index = counter.peek(PlaceholderKind::Datetime);
        let placeholder = Placeholder::new(PlaceholderKind::Datetime, index).to_string();
        match collapse_phrase_in_block(block, phrase, &placeholder, MatchCase::Sensitive)? {
            Some(next) => {
                *block = next;
                counter.next(PlaceholderKind::Datetime);
                Ok(Some(DateMention {
                    index,
                    placeholder,
                    text: phrase.to_string(),
                    value,
                    source,
                }))
            }
            None => {
                warnings.push(StageWarning::from_error(STAGE, &PreprocessError::span_not_found(phrase)));
                Ok(None)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
