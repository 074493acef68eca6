//! Configuration types and genre presets.
//!
//! Everything tunable lives here: which genre profile supplies the patterns,
//! how eagerly story elements merge, and how registry writes are staged.
//! All types round-trip through JSON so the WASM facade can accept a config
//! object from the host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::elements::{ElementKind, MatchStrictness};
use crate::error::{PreprocessError, Result};

// =============================================================================
// Policies
// =============================================================================

/// When registry writes for a passage become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StagingPolicy {
    /// Writes go to a working copy that is committed only if the passage
    /// finishes without a fatal error.
    #[default]
    StageThenCommit,
    /// Writes land as they happen, even if a later stage fails.
    Immediate,
}

/// Lifetime of the registry across a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryScope {
    /// Reset before every document.
    #[default]
    PerDocument,
    /// Shared across every document of the batch.
    PerBatch,
}

// =============================================================================
// Genre Profiles
// =============================================================================

/// Ordered regex substitution applied during cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRule {
    pub pattern: String,
    pub replacement: String,
}

/// Direct-speech pattern. Must contain a `quote` group and, when
/// `with_speaker` is set, a `speaker` group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRule {
    pub pattern: String,
    pub with_speaker: bool,
}

fn cleanup(pattern: &str, replacement: &str) -> CleanupRule {
    CleanupRule {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    }
}

fn speech(pattern: &str, with_speaker: bool) -> SpeechRule {
    SpeechRule {
        pattern: pattern.to_string(),
        with_speaker,
    }
}

/// Genre-specific bundle of patterns and tables.
///
/// Entity patterns may capture the mention in a `name` group; otherwise the
/// whole match is the mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreProfile {
    pub name: String,
    #[serde(default)]
    pub cleanup: Vec<CleanupRule>,
    #[serde(default)]
    pub date_pattern: Option<String>,
    #[serde(default)]
    pub entity_patterns: BTreeMap<ElementKind, String>,
    #[serde(default)]
    pub speech: Vec<SpeechRule>,
    /// Lowercase phrase → replacement token.
    #[serde(default)]
    pub fixed_phrases: BTreeMap<String, String>,
    pub scene_heading: String,
}

pub const DEFAULT_DATE_PATTERN: &str = r"\d{2}\.\d{2}\.\d{4}";

const SCENE_HEADING: &str = r"(?m)^[ \t]*(?:ИНТ|НАТ|ЭКСТ|INT|EXT)\.";

impl GenreProfile {
    pub fn literary_prose() -> Self {
        Self {
            name: "literary_prose".into(),
            cleanup: vec![
                cleanup(r"\s+", " "),
                cleanup(r"-{2,}", "—"),
                cleanup(r",\s*,", ","),
                cleanup(r"\s*,\s*", ", "),
            ],
            date_pattern: Some(DEFAULT_DATE_PATTERN.into()),
            entity_patterns: BTreeMap::from([(
                ElementKind::Person,
                r"\b[А-ЯЁ][а-яё]{2,}(?:\s+[А-ЯЁ][а-яё]{2,})?\b".to_string(),
            )]),
            speech: vec![
                speech(
                    r#"(?P<speaker>[А-ЯЁ][а-яё]{2,}(?:\s+[А-ЯЁ][а-яё]{2,})*)\s*[:\-]\s*[«"“](?P<quote>.+?)[»"”]"#,
                    true,
                ),
                speech(r"(?m)^[\-–—]\s*(?P<quote>.+)$", false),
                speech(r#"[«"“](?P<quote>.+?)[»"”]"#, false),
            ],
            fixed_phrases: BTreeMap::new(),
            scene_heading: SCENE_HEADING.into(),
        }
    }

    pub fn hollywood_script() -> Self {
        Self {
            name: "hollywood_script".into(),
            cleanup: vec![
                cleanup(
                    r"(?im)^(?:INT\.|EXT\.|ИНТ(?:ЕРЬЕР)?\.?|ЭКСТ(?:ЕРЬЕР)?\.?|НАТ\.?)\s.*$",
                    "",
                ),
                cleanup(r"\s{2,}", " "),
                cleanup(r",\s*,", ","),
                cleanup(r"\s*,\s*", ", "),
            ],
            date_pattern: Some(DEFAULT_DATE_PATTERN.into()),
            entity_patterns: BTreeMap::from([(
                ElementKind::Person,
                r"\b[A-ZА-ЯЁ]{3,}(?:\s+[A-ZА-ЯЁ]{3,})*\b".to_string(),
            )]),
            speech: vec![
                speech(r"(?m)^(?P<speaker>[A-ZА-ЯЁ ]{3,}):\s*(?P<quote>.+)$", true),
                speech(r#"[“"”](?P<quote>.+?)[“"”]"#, false),
                speech(r"(?m)^[\-–]\s*(?P<quote>.+)$", false),
            ],
            fixed_phrases: BTreeMap::from([
                ("v.o.".to_string(), "<|VOICE_OVER|>".to_string()),
                ("o.s.".to_string(), "<|OFF_SCREEN|>".to_string()),
                ("cut to".to_string(), "<|CUT_TO|>".to_string()),
                ("fade out".to_string(), "<|FADE_OUT|>".to_string()),
                ("fade in".to_string(), "<|FADE_IN|>".to_string()),
            ]),
            scene_heading: SCENE_HEADING.into(),
        }
    }

    pub fn russian_script() -> Self {
        Self {
            name: "russian_script".into(),
            cleanup: vec![
                cleanup(
                    r"(?im)^(?:ИНТ(?:ЕРЬЕР)?|ЭКСТ(?:ЕРЬЕР)?|ИНТ\.|ЭКСТ\.|НАТ(?:\s+НАТ\.)?)\s*[\s\-:.]+.*$",
                    "",
                ),
                cleanup(r"\s{2,}", " "),
            ],
            date_pattern: Some(DEFAULT_DATE_PATTERN.into()),
            entity_patterns: BTreeMap::from([(
                ElementKind::Person,
                r"(?m)^(?P<name>[А-ЯЁ]{3,}):\s".to_string(),
            )]),
            speech: vec![
                speech(r"(?m)^(?P<speaker>[А-ЯЁ]{3,}):\s*(?P<quote>.+)$", true),
                speech(r"(?m)^[\-–—]\s*(?P<quote>.+)$", false),
                speech(r#"[«"“](?P<quote>.+?)[»"”]"#, false),
                speech(r#"\((?P<speaker>[А-ЯЁ][а-яё]{2,})\)\s*[«"“](?P<quote>.+?)[»"”]"#, true),
                speech(r"(?m)^(?P<speaker>[А-ЯЁ]{3,})\s*[\-–—]\s*(?P<quote>.+)$", true),
                speech(r"(?m)^(?P<speaker>[А-ЯЁ]{3,})\s+(?P<quote>[а-яё].+)$", true),
            ],
            fixed_phrases: BTreeMap::from([
                ("за кадром".to_string(), "<|VOICE_OVER|>".to_string()),
                ("затемнение".to_string(), "<|FADE_OUT|>".to_string()),
                ("из затемнения".to_string(), "<|FADE_IN|>".to_string()),
                ("смена кадра".to_string(), "<|CUT_TO|>".to_string()),
            ]),
            scene_heading: SCENE_HEADING.into(),
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "literary_prose" | "prose" => Ok(Self::literary_prose()),
            "hollywood_script" | "hollywood" => Ok(Self::hollywood_script()),
            "russian_script" | "russian" => Ok(Self::russian_script()),
            other => Err(PreprocessError::Config(format!("unknown profile {:?}", other))),
        }
    }
}

impl Default for GenreProfile {
    fn default() -> Self {
        Self::literary_prose()
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub profile: GenreProfile,
    /// Merge rule for story elements. Default: shared word.
    pub match_strictness: MatchStrictness,
    /// Default: stage then commit.
    pub staging: StagingPolicy,
    /// Default: per document.
    pub registry_scope: RegistryScope,
    /// Append `<|C_xxx|>` case markers after non-nominative placeholders.
    /// Default: false
    pub annotate_case: bool,
    /// Record modifiers and governing verbs as element properties.
    /// Default: true
    pub extract_properties: bool,
    /// Shortest capitalized word the registry sweep will replace. Default: 3
    pub min_sweep_word_len: usize,
    /// Word budget per paragraph when splitting documents. Default: 100
    pub max_paragraph_words: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            profile: GenreProfile::default(),
            match_strictness: MatchStrictness::default(),
            staging: StagingPolicy::default(),
            registry_scope: RegistryScope::default(),
            annotate_case: false,
            extract_properties: true,
            min_sweep_word_len: 3,
            max_paragraph_words: 100,
        }
    }
}

impl PreprocessConfig {
    pub fn with_profile(profile: GenreProfile) -> Self {
        Self {
            profile,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_paragraph_words == 0 {
            return Err(PreprocessError::Config(
                "max_paragraph_words must be positive".into(),
            ));
        }
        if self.min_sweep_word_len == 0 {
            return Err(PreprocessError::Config(
                "min_sweep_word_len must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
