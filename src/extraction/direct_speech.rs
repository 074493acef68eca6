//! Direct speech: who said what, by genre-specific patterns.
//!
//! Quotes are recorded next to the passage; the passage text is not
//! rewritten. [`DirectSpeech::marked`] renders the
//! `<|QUOTE_ST|>speaker<|QUOTE_MID|>quote<|QUOTE_END|>` form for consumers
//! that want inline markers.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SpeechRule;
use crate::error::{PreprocessError, Result};

/// Speaker used when a pattern does not name one.
pub const UNKNOWN_SPEAKER: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSpeech {
    pub speaker: String,
    pub quote: String,
}

impl DirectSpeech {
    pub fn marked(&self) -> String {
        format!(
            "<|QUOTE_ST|>{}<|QUOTE_MID|>{}<|QUOTE_END|>",
            self.speaker, self.quote
        )
    }
}

struct CompiledRule {
    regex: Regex,
    with_speaker: bool,
}

pub struct DirectSpeechExtractor {
    rules: Vec<CompiledRule>,
}

impl DirectSpeechExtractor {
    pub fn new(rules: &[SpeechRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern)?;
                if !regex.capture_names().flatten().any(|n| n == "quote") {
                    return Err(PreprocessError::Config(format!(
                        "speech pattern {:?} has no quote group",
                        rule.pattern
                    )));
                }
                Ok(CompiledRule {
                    regex,
                    with_speaker: rule.with_speaker,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Every quote found by the rules, in rule order. A span claimed by an
    /// earlier rule is not matched again by a later one.
    pub fn extract(&self, text: &str) -> Vec<DirectSpeech> {
        let mut claimed: Vec<std::ops::Range<usize>> = Vec::new();
        let mut found = Vec::new();
        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let (Some(whole), Some(quote)) = (caps.get(0), caps.name("quote")) else {
                    continue;
                };
                if claimed.iter().any(|r| r.start < whole.end() && whole.start() < r.end) {
                    continue;
                }
                let speaker = caps
                    .name("speaker")
                    .filter(|_| rule.with_speaker)
                    .map(|m| m.as_str().trim())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(UNKNOWN_SPEAKER);
                claimed.push(whole.range());
                found.push(DirectSpeech {
                    speaker: speaker.to_string(),
                    quote: quote.as_str().trim().to_string(),
                });
            }
        }
        found
    }
}
