//! EventPreprocessor: one passage in, one [`StoryEvent`] out.
//!
//! Stage order:
//! 1. cleanup (profile regexes, trim)
//! 2. segmentation, tagging and parsing into a [`MarkupBlock`]
//! 3. fixed phrases
//! 4. dates (pattern, then parser; shared DATETIME counter)
//! 5. entities, resolved against the registry
//! 6. entity properties (optional)
//! 7. direct speech
//! 8. canonical reordering
//! 9. event-type classification
//!
//! Registry writes are staged per passage by default and committed only when
//! every stage succeeded.

use instant::Instant;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::config::{PreprocessConfig, StagingPolicy};
use crate::elements::{PartialDateTime, Registry, StoryElement};
use crate::error::{Result, StageWarning};
use crate::extraction::{
    properties, Annotators, DateExtractor, DateMention, DirectSpeech, DirectSpeechExtractor,
    ElementMapping, EntityExtractor, EntityMention, FixedPhraseTable, IndexCounter, TextCleaner,
};
use crate::markup::{classify_block, rearrange_block, EventType, MarkupBlock};

// =============================================================================
// Types
// =============================================================================

/// Timing statistics for each stage
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassageTimings {
    pub total_us: u64,
    pub cleanup_us: u64,
    pub annotate_us: u64,
    pub phrases_us: u64,
    pub dates_us: u64,
    pub entities_us: u64,
    pub properties_us: u64,
    pub speech_us: u64,
    pub rearrange_us: u64,
    pub classify_us: u64,
}

/// Aggregate statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassageStats {
    pub timings: PassageTimings,
    pub sentences: usize,
    pub tokens: usize,
    pub phrases_replaced: usize,
    pub dates_found: usize,
    pub entities_found: usize,
    pub properties_found: usize,
    pub quotes_found: usize,
}

/// Output for one passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryEvent {
    pub id: Uuid,
    pub index: usize,
    pub source_text: String,
    /// Placeholder-bearing text of the canonical block, one sentence per line.
    pub text: String,
    pub block: MarkupBlock,
    pub dates: Vec<DateMention>,
    pub elements: ElementMapping,
    pub mentions: Vec<EntityMention>,
    pub quotes: Vec<DirectSpeech>,
    pub stats: PassageStats,
    pub warnings: Vec<StageWarning>,
}

impl StoryEvent {
    /// Event type of every sentence, in order.
    pub fn event_types(&self) -> Vec<EventType> {
        self.block.iter().map(|m| m.event_type()).collect()
    }
}

fn micros(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

// =============================================================================
// Stages
// =============================================================================

/// Compiled stage objects. Kept apart from the registry so a passage can
/// borrow both at once.
struct Stages {
    cleaner: TextCleaner,
    phrases: FixedPhraseTable,
    dates: DateExtractor,
    entities: EntityExtractor,
    speech: DirectSpeechExtractor,
    extract_properties: bool,
}

impl Stages {
    fn compile(config: &PreprocessConfig) -> Result<Self> {
        let profile = &config.profile;
        Ok(Self {
            cleaner: TextCleaner::new(&profile.cleanup)?,
            phrases: FixedPhraseTable::new(&profile.fixed_phrases),
            dates: DateExtractor::from_profile(profile)?,
            entities: EntityExtractor::new(profile, config)?,
            speech: DirectSpeechExtractor::new(&profile.speech)?,
            extract_properties: config.extract_properties,
        })
    }

    fn run(
        &self,
        index: usize,
        text: &str,
        reference: Option<&PartialDateTime>,
        annotators: &Annotators,
        registry: &mut Registry,
    ) -> Result<StoryEvent> {
        let overall = Instant::now();
        let mut stats = PassageStats::default();
        let mut warnings = Vec::new();

        let start = Instant::now();
        let cleaned = self.cleaner.clean(text);
        stats.timings.cleanup_us = micros(start);

        let start = Instant::now();
        let block = annotate(&cleaned, annotators)?;
        stats.timings.annotate_us = micros(start);
        stats.sentences = block.len();
        debug!(sentences = block.len(), tokens = block.token_count(), "annotated");

        let start = Instant::now();
        let (block, replaced) = self.phrases.apply(&block)?;
        stats.timings.phrases_us = micros(start);
        stats.phrases_replaced = replaced;

        let start = Instant::now();
        let mut counter = IndexCounter::new();
        let (block, dates) = self.dates.extract(
            &block,
            annotators.dates.as_deref(),
            reference,
            &mut counter,
            &mut warnings,
        )?;
        stats.timings.dates_us = micros(start);
        stats.dates_found = dates.len();

        let start = Instant::now();
        let outcome = self
            .entities
            .extract(&block, registry, annotators.ner.as_deref(), &mut warnings)?;
        stats.timings.entities_us = micros(start);
        stats.entities_found = outcome.mentions.len();
        let block = outcome.block;

        if self.extract_properties {
            let start = Instant::now();
            stats.properties_found = properties::extract(&block, &outcome.elements, registry);
            stats.timings.properties_us = micros(start);
        }

        let start = Instant::now();
        let quotes = self.speech.extract(&block.lines());
        stats.timings.speech_us = micros(start);
        stats.quotes_found = quotes.len();

        let start = Instant::now();
        let block = rearrange_block(&block)?;
        stats.timings.rearrange_us = micros(start);

        let start = Instant::now();
        let block = classify_block(&block);
        stats.timings.classify_us = micros(start);

        block.validate()?;
        stats.tokens = block.token_count();
        stats.timings.total_us = micros(overall);

        for warning in &warnings {
            debug!(stage = %warning.stage, kind = warning.kind.as_str(), "{}", warning.message);
        }

        Ok(StoryEvent {
            id: Uuid::new_v4(),
            index,
            source_text: text.to_string(),
            text: block.lines(),
            block,
            dates,
            elements: outcome.elements,
            mentions: outcome.mentions,
            quotes,
            stats,
            warnings,
        })
    }
}

/// Segment, tag and parse `text` into a passage.
fn annotate(text: &str, annotators: &Annotators) -> Result<MarkupBlock> {
    let sentences = annotators.segmenter.segment(text)?;
    let mut morph = Vec::with_capacity(sentences.len());
    let mut syntax = Vec::with_capacity(sentences.len());
    for tokens in &sentences {
        morph.push(annotators.morph.tag(tokens)?);
        syntax.push(annotators.syntax.parse(tokens)?);
    }
    MarkupBlock::from_annotations(&morph, &syntax)
}

// =============================================================================
// EventPreprocessor
// =============================================================================

pub struct EventPreprocessor {
    config: PreprocessConfig,
    stages: Stages,
    registry: Registry,
}

impl EventPreprocessor {
    /// Compile every profile pattern. Invalid patterns fail here, not per
    /// passage.
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        let registry = Registry::new(config.match_strictness);
        Self::with_registry(config, registry)
    }

    /// Start from an existing registry.
    pub fn with_registry(config: PreprocessConfig, registry: Registry) -> Result<Self> {
        config.validate()?;
        let stages = Stages::compile(&config)?;
        info!(profile = %config.profile.name, staging = ?config.staging, "preprocessor ready");
        Ok(Self {
            config,
            stages,
            registry,
        })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn story_elements(&self) -> Vec<StoryElement> {
        self.registry.elements().cloned().collect()
    }

    /// Forget every story element.
    pub fn reset(&mut self) {
        self.registry.reset();
    }

    pub fn process(&mut self, index: usize, text: &str, annotators: &Annotators) -> Result<StoryEvent> {
        self.process_at(index, text, None, annotators)
    }

    /// Process with a reference date for relative date phrases.
    pub fn process_at(
        &mut self,
        index: usize,
        text: &str,
        reference: Option<&PartialDateTime>,
        annotators: &Annotators,
    ) -> Result<StoryEvent> {
        let span = info_span!("passage", index);
        let _guard = span.enter();

        let result = match self.config.staging {
            StagingPolicy::StageThenCommit => {
                let mut staged = self.registry.stage();
                let result = self.stages.run(index, text, reference, annotators, &mut staged);
                if result.is_ok() {
                    staged.commit();
                }
                result
            }
            StagingPolicy::Immediate => {
                self.stages
                    .run(index, text, reference, annotators, &mut self.registry)
            }
        };

        match &result {
            Ok(event) => debug!(
                total_us = event.stats.timings.total_us,
                warnings = event.warnings.len(),
                "passage done"
            ),
            Err(err) => error!(source = %text, kind = err.kind().as_str(), "passage failed: {}", err),
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ElementKind;
    use crate::error::PreprocessError;
    use crate::extraction::{AnnotatedSentence, PrecomputedAnnotations};
    use crate::markup::{MorphToken, SyntaxToken};

    /// (text, pos, head, rel) per token
    fn sentence(words: &[(&str, &str, usize, &str)]) -> AnnotatedSentence {
        AnnotatedSentence {
            morph: words.iter().map(|(t, p, _, _)| MorphToken::new(*t, *p)).collect(),
            syntax: words
                .iter()
                .enumerate()
                .map(|(i, (t, _, h, r))| SyntaxToken::new(i + 1, *h, *r, *t))
                .collect(),
        }
    }

    fn annotators(sentences: Vec<AnnotatedSentence>) -> Annotators {
        Annotators::precomputed(PrecomputedAnnotations {
            sentences,
            ..Default::default()
        })
    }

    fn anna_said() -> Annotators {
        annotators(vec![sentence(&[
            ("Анна", "PROPN", 3, "nsubj"),
            ("Сергеевна", "PROPN", 1, "flat:name"),
            ("сказала", "VERB", 0, "root"),
        ])])
    }

    #[test]
    fn test_person_span_and_dynamic_event() {
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        let event = pre.process(0, "Анна Сергеевна сказала", &anna_said()).unwrap();

        assert_eq!(event.text, "<|PER_1|> сказала");
        assert_eq!(event.event_types(), vec![EventType::Dynamic]);
        let root = event.block.markups()[0].root().unwrap();
        assert_eq!(root.text, "сказала");
        let id = event.elements[&ElementKind::Person][&1];
        assert_eq!(pre.registry().find_by_id(&id).unwrap().name, "Анна Сергеевна");
        assert!(event.warnings.is_empty());
    }

    #[test]
    fn test_date_literal() {
        let ann = annotators(vec![sentence(&[
            ("Это", "PRON", 2, "nsubj"),
            ("случилось", "VERB", 0, "root"),
            ("12.05.2020", "NUM", 2, "obl"),
        ])]);
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        let event = pre.process(3, "Это случилось 12.05.2020", &ann).unwrap();

        assert_eq!(event.index, 3);
        assert!(event.text.contains("<|DATETIME_1|>"));
        let date = &event.dates[0].value;
        assert_eq!((date.year, date.month, date.day), (Some(2020), Some(5), Some(12)));
    }

    #[test]
    fn test_surname_resolves_across_passages() {
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        let first = annotators(vec![sentence(&[
            ("Иван", "PROPN", 3, "nsubj"),
            ("Петров", "PROPN", 1, "flat:name"),
            ("пришёл", "VERB", 0, "root"),
        ])]);
        let second = annotators(vec![sentence(&[
            ("Петров", "PROPN", 2, "nsubj"),
            ("ушёл", "VERB", 0, "root"),
        ])]);
        let a = pre.process(0, "Иван Петров пришёл", &first).unwrap();
        let b = pre.process(1, "Петров ушёл", &second).unwrap();

        assert_eq!(
            a.elements[&ElementKind::Person][&1],
            b.elements[&ElementKind::Person][&1]
        );
        assert_eq!(pre.registry().len(), 1);
        // "ушёл" governs the subject, so it is recorded as a property
        let element = pre.registry().find_by_id(&b.elements[&ElementKind::Person][&1]).unwrap();
        assert!(element.properties.contains(&"ушёл".to_string()));
    }

    #[test]
    fn test_failed_passage_leaves_registry_untouched() {
        let mut broken = sentence(&[("спал", "VERB", 0, "root")]);
        broken.morph.clear();
        let ann = annotators(vec![
            sentence(&[("Борис", "PROPN", 2, "nsubj"), ("пришёл", "VERB", 0, "root")]),
            broken,
        ]);
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        pre.process(0, "Анна Сергеевна сказала", &anna_said()).unwrap();

        let err = pre.process(1, "Борис пришёл. спал", &ann).unwrap_err();
        assert!(matches!(err, PreprocessError::StructuralMismatch { .. }));
        assert!(err.is_fatal());
        assert_eq!(pre.registry().len(), 1);
        assert!(pre.registry().find_by_text("Борис").is_none());
    }

    #[test]
    fn test_unknown_sentence_is_annotator_error() {
        let known = sentence(&[("Борис", "PROPN", 2, "nsubj"), ("пришёл", "VERB", 0, "root")]);
        let only_known = PrecomputedAnnotations {
            sentences: vec![known.clone()],
            ..Default::default()
        };
        let ann = Annotators {
            segmenter: Box::new(PrecomputedAnnotations {
                sentences: vec![known, sentence(&[("Он", "PRON", 0, "root")])],
                ..Default::default()
            }),
            morph: Box::new(only_known.clone()),
            syntax: Box::new(only_known),
            ner: None,
            dates: None,
        };
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        let err = pre.process(0, "Борис пришёл. Он", &ann).unwrap_err();
        assert!(matches!(err, PreprocessError::Annotator(_)));
        assert!(pre.registry().is_empty());
    }

    #[test]
    fn test_immediate_policy_processes_normally() {
        let config = PreprocessConfig {
            staging: StagingPolicy::Immediate,
            ..Default::default()
        };
        let mut pre = EventPreprocessor::new(config).unwrap();
        pre.process(0, "Анна Сергеевна сказала", &anna_said()).unwrap();
        assert_eq!(pre.registry().len(), 1);
        pre.reset();
        assert!(pre.registry().is_empty());
    }

    #[test]
    fn test_quotes_recorded_without_rewriting() {
        let ann = annotators(vec![sentence(&[
            ("Он", "PRON", 2, "nsubj"),
            ("крикнул", "VERB", 0, "root"),
            ("«", "PUNCT", 4, "punct"),
            ("Стой", "VERB", 2, "ccomp"),
            ("»", "PUNCT", 4, "punct"),
        ])]);
        let mut pre = EventPreprocessor::new(PreprocessConfig::default()).unwrap();
        let event = pre.process(0, "Он крикнул «Стой»", &ann).unwrap();
        assert_eq!(event.quotes.len(), 1);
        assert_eq!(event.quotes[0].quote, "Стой");
        assert!(event.text.contains("Стой"));
    }

    #[test]
    fn test_invalid_profile_pattern_fails_at_construction() {
        let mut config = PreprocessConfig::default();
        config.profile.date_pattern = Some("(".into());
        assert!(matches!(
            EventPreprocessor::new(config),
            Err(PreprocessError::Pattern(_))
        ));
    }
}
