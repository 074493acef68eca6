//! BatchProcessor: whole documents through the preprocessor.
//!
//! A document is split into paragraphs, each paragraph is annotated and
//! processed, and failures are written to the [`ErrorLedger`] without
//! stopping the document. Sources whose content was already processed are
//! skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, info_span, warn};

use super::ledger::{ErrorLedger, ProcessedLedger};
use super::paragraphs::ParagraphSplitter;
use super::preprocessor::{EventPreprocessor, StoryEvent};
use crate::config::{PreprocessConfig, RegistryScope};
use crate::elements::{ElementKind, StoryElement};
use crate::error::Result;
use crate::extraction::Annotators;

/// Everything produced for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub source: String,
    pub content_hash: String,
    pub paragraphs: usize,
    pub events: Vec<StoryEvent>,
    /// Registry contents after the document, per kind.
    pub story_elements: BTreeMap<ElementKind, Vec<StoryElement>>,
    pub failed_paragraphs: Vec<usize>,
}

pub struct BatchProcessor {
    preprocessor: EventPreprocessor,
    splitter: ParagraphSplitter,
    scope: RegistryScope,
    errors: ErrorLedger,
    processed: ProcessedLedger,
}

impl BatchProcessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        let splitter = ParagraphSplitter::from_config(&config)?;
        let scope = config.registry_scope;
        Ok(Self {
            preprocessor: EventPreprocessor::new(config)?,
            splitter,
            scope,
            errors: ErrorLedger::new(),
            processed: ProcessedLedger::new(),
        })
    }

    /// Continue a run whose finished sources are listed in `processed`.
    pub fn resume(config: PreprocessConfig, processed: ProcessedLedger) -> Result<Self> {
        let mut batch = Self::new(config)?;
        batch.processed = processed;
        Ok(batch)
    }

    pub fn preprocessor(&self) -> &EventPreprocessor {
        &self.preprocessor
    }

    pub fn errors(&self) -> &ErrorLedger {
        &self.errors
    }

    pub fn processed(&self) -> &ProcessedLedger {
        &self.processed
    }

    /// Process one document. `annotate` builds the annotators for each
    /// paragraph. Returns `None` when the same content was already
    /// processed.
    pub fn process_document<F>(&mut self, source: &str, text: &str, mut annotate: F) -> Option<DocumentOutput>
    where
        F: FnMut(&str) -> Result<Annotators>,
    {
        if self.processed.check(text) {
            info!(source, "already processed, skipping");
            return None;
        }

        let span = info_span!("document", source);
        let _guard = span.enter();

        if self.scope == RegistryScope::PerDocument {
            self.preprocessor.reset();
        }

        let paragraphs = self.splitter.split(text);
        info!(paragraphs = paragraphs.len(), "paragraphs split");

        let mut events = Vec::with_capacity(paragraphs.len());
        let mut failed = Vec::new();
        for (index, paragraph) in paragraphs.iter().enumerate() {
            let result = annotate(paragraph)
                .and_then(|annotators| self.preprocessor.process(index, paragraph, &annotators));
            match result {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(index, "paragraph skipped: {}", err);
                    self.errors.record(source, Some(index), &err);
                    failed.push(index);
                }
            }
        }

        let hash = self.processed.record(text);
        info!(events = events.len(), failed = failed.len(), "document done");

        Some(DocumentOutput {
            source: source.to_string(),
            content_hash: hash,
            paragraphs: paragraphs.len(),
            events,
            story_elements: self.story_elements(),
            failed_paragraphs: failed,
        })
    }

    /// Registry contents grouped by kind.
    pub fn story_elements(&self) -> BTreeMap<ElementKind, Vec<StoryElement>> {
        let registry = self.preprocessor.registry();
        ElementKind::ALL
            .iter()
            .map(|kind| (*kind, registry.repo(*kind).elements().to_vec()))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
