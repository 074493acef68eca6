//! Entity extraction and resolution against the registry.
//!
//! One pass over a passage:
//! 1. profile patterns over each sentence's text; matched tokens are
//!    narrowed to proper nouns and separators, then collapsed
//! 2. tagger spans, collapsed by surface phrase
//! 3. sweep: capitalized words naming an element seen in this pass or
//!    already in the registry become that element's placeholder
//! 4. pass-local mentions merge into the registry; placeholder indices are
//!    rewritten to batch indices
//! 5. identical adjacent placeholders merge
//!
//! The returned mapping resolves every placeholder left in the passage to
//! a registry id.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::debug;
use uuid::Uuid;

use super::annotators::NerTagger;
use super::placeholder::{
    find_all, is_special_token, merge_adjacent_block, remap_markup, special_ranges, IndexCounter,
    Placeholder,
};
use crate::config::{GenreProfile, PreprocessConfig};
use crate::elements::{ElementKind, ExtractionOrigin, Registry, StoryElement};
use crate::error::{PreprocessError, Result, StageWarning};
use crate::markup::{
    collapse_run, find_run, join_with_spans, trim_run, Markup, MarkupBlock, MatchCase, Token, TRIM_PUNCT,
};

const STAGE: &str = "entities";
const NOMINATIVE: &str = "Nom";

/// kind → placeholder index → registry id
pub type ElementMapping = BTreeMap<ElementKind, BTreeMap<usize, Uuid>>;

/// Result of entity resolution for one passage.
#[derive(Debug, Clone, Default)]
pub struct EntityOutcome {
    pub block: MarkupBlock,
    pub elements: ElementMapping,
    pub mentions: Vec<EntityMention>,
}

/// One pass-local mention, before registry merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub kind: ElementKind,
    pub surface: String,
    pub origin: ExtractionOrigin,
}

/// Pass-local candidates, numbered per kind.
#[derive(Default)]
struct PassCandidates {
    by_kind: BTreeMap<ElementKind, BTreeMap<usize, StoryElement>>,
    counter: IndexCounter,
}

impl PassCandidates {
    fn add(&mut self, element: StoryElement) -> usize {
        let index = self.counter.next(element.kind.into());
        self.by_kind.entry(element.kind).or_default().insert(index, element);
        index
    }

    /// Local element whose name contains `word`, in PER, LOC, ORG order.
    fn find_word(&self, word: &str) -> Option<(ElementKind, usize)> {
        ElementKind::ALL.iter().find_map(|kind| {
            self.by_kind.get(kind)?.iter().find_map(|(idx, el)| {
                el.name.split_whitespace().any(|w| w == word).then_some((*kind, *idx))
            })
        })
    }

    fn find_name(&self, kind: ElementKind, name: &str) -> Option<usize> {
        self.by_kind
            .get(&kind)?
            .iter()
            .find_map(|(idx, el)| (el.name == name).then_some(*idx))
    }
}

fn placeholder_text(kind: ElementKind, index: usize, case: Option<&str>, annotate_case: bool) -> String {
    let mut ph = Placeholder::new(kind.into(), index);
    if annotate_case {
        if let Some(case) = case.filter(|c| *c != NOMINATIVE) {
            ph = ph.with_case(case);
        }
    }
    ph.to_string()
}

pub struct EntityExtractor {
    patterns: Vec<(ElementKind, Regex)>,
    annotate_case: bool,
    min_sweep_word_len: usize,
}

impl EntityExtractor {
    pub fn new(profile: &GenreProfile, config: &PreprocessConfig) -> Result<Self> {
        let patterns = profile
            .entity_patterns
            .iter()
            .map(|(kind, pattern)| Ok((*kind, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            annotate_case: config.annotate_case,
            min_sweep_word_len: config.min_sweep_word_len,
        })
    }

    pub fn extract(
        &self,
        block: &MarkupBlock,
        registry: &mut Registry,
        ner: Option<&dyn NerTagger>,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<EntityOutcome> {
        let mut pass = PassCandidates::default();
        let mut mentions = Vec::new();

        let mut block = self.pattern_pass(block, &mut pass, &mut mentions)?;
        if let Some(ner) = ner {
            block = self.tagger_pass(&block, ner, &mut pass, &mut mentions, warnings)?;
        }
        block = self.sweep(&block, registry, &mut pass);

        let mut assignments = BTreeMap::new();
        for (kind, batch) in std::mem::take(&mut pass.by_kind) {
            let assignment = registry.repo_mut(kind).add_elements(batch);
            block = block.try_map(|m| Ok(remap_markup(m, kind.into(), &assignment.new_indexes)))?;
            assignments.insert(kind, assignment.ids);
        }
        let block = merge_adjacent_block(&block)?;

        let elements = resolve_mapping(&block, &assignments);
        debug!(
            mentions = mentions.len(),
            resolved = elements.values().map(BTreeMap::len).sum::<usize>(),
            "entity extraction done"
        );
        Ok(EntityOutcome {
            block,
            elements,
            mentions,
        })
    }

    /// Profile patterns, matched one sentence at a time so line anchors see
    /// every sentence start.
    fn pattern_pass(
        &self,
        block: &MarkupBlock,
        pass: &mut PassCandidates,
        mentions: &mut Vec<EntityMention>,
    ) -> Result<MarkupBlock> {
        let mut markups = block.markups().to_vec();
        for (kind, pattern) in &self.patterns {
            for markup in markups.iter_mut() {
                let mut numbered = Vec::new();
                for run in pattern_runs(markup, pattern) {
                    let index = pass.add(StoryElement::new(run.name.clone(), *kind, ExtractionOrigin::Pattern));
                    mentions.push(EntityMention {
                        kind: *kind,
                        surface: run.name,
                        origin: ExtractionOrigin::Pattern,
                    });
                    let text = placeholder_text(*kind, index, run.case.as_deref(), self.annotate_case);
                    numbered.push((run.range, text));
                }

                // right to left so earlier positions stay valid
                for (range, text) in numbered.into_iter().rev() {
                    if let Some(collapsed) = collapse_run(markup, range, &text)? {
                        *markup = collapsed;
                    }
                }
            }
        }
        Ok(MarkupBlock::new(markups))
    }

    /// Tagger spans, located again in the tree by their surface phrase.
    fn tagger_pass(
        &self,
        block: &MarkupBlock,
        ner: &dyn NerTagger,
        pass: &mut PassCandidates,
        mentions: &mut Vec<EntityMention>,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<MarkupBlock> {
        let mut block = block.clone();
        let text = block.text();
        let taken = special_ranges(&text);

        for span in ner.recognize(&text)? {
            if taken.iter().any(|r| r.start < span.end && span.start < r.end) {
                continue;
            }
            let Some(surface) = text.get(span.start..span.end) else {
                continue;
            };
            let located = block.iter().enumerate().find_map(|(sentence, markup)| {
                find_run(markup, surface, MatchCase::Insensitive).map(|range| (sentence, trim_run(markup, range)))
            });
            let Some((sentence, range)) = located.filter(|(_, range)| !range.is_empty()) else {
                warnings.push(StageWarning::from_error(STAGE, &PreprocessError::span_not_found(surface)));
                continue;
            };

            let markup = &block.markups()[sentence];
            let case = markup.tokens()[range.clone()]
                .iter()
                .find(|t| t.pos == "PROPN")
                .and_then(|t| t.feat("Case"));
            let index = pass.counter.peek(span.kind.into());
            let placeholder = placeholder_text(span.kind, index, case, self.annotate_case);
            let Some(collapsed) = collapse_run(markup, range, &placeholder)? else {
                continue;
            };

            let mut markups = block.markups().to_vec();
            markups[sentence] = collapsed;
            block = MarkupBlock::new(markups);
            pass.add(StoryElement::new(span.normal.clone(), span.kind, ExtractionOrigin::Tagger));
            mentions.push(EntityMention {
                kind: span.kind,
                surface: surface.to_string(),
                origin: ExtractionOrigin::Tagger,
            });
        }
        Ok(block)
    }

    /// Replace bare capitalized words naming a known element.
    fn sweep(&self, block: &MarkupBlock, registry: &Registry, pass: &mut PassCandidates) -> MarkupBlock {
        let markups = block
            .iter()
            .map(|markup| {
                let tokens = markup
                    .iter()
                    .map(|token| match self.sweep_word(token, registry, pass) {
                        Some(text) => token.relabeled(text),
                        None => token.clone(),
                    })
                    .collect();
                markup.with_tokens(tokens)
            })
            .collect();
        MarkupBlock::new(markups)
    }

    fn sweep_word(&self, token: &Token, registry: &Registry, pass: &mut PassCandidates) -> Option<String> {
        let word = token.text.as_str();
        if is_special_token(word)
            || word.chars().count() < self.min_sweep_word_len
            || !word.chars().next().is_some_and(char::is_uppercase)
        {
            return None;
        }

        let (kind, index) = match pass.find_word(word) {
            Some(found) => found,
            None => {
                let element = registry.find_by_text(word)?;
                let index = pass
                    .find_name(element.kind, &element.name)
                    .unwrap_or_else(|| pass.add(element.clone()));
                (element.kind, index)
            }
        };
        Some(placeholder_text(kind, index, token.feat("Case"), self.annotate_case))
    }
}

/// A pattern match narrowed to a token run of one sentence.
struct PatternRun {
    range: Range<usize>,
    name: String,
    case: Option<String>,
}

/// Runs matched by `pattern` in one sentence, in text order. Matches are
/// narrowed to proper nouns and separators contiguous from the first hit.
/// A run overlapping an earlier one is dropped.
fn pattern_runs(markup: &Markup, pattern: &Regex) -> Vec<PatternRun> {
    let (text, spans) = markup.project();
    let taken = special_ranges(&text);
    let tokens = markup.tokens();

    let mut runs: Vec<PatternRun> = Vec::new();
    for caps in pattern.captures_iter(&text) {
        let Some(m) = caps.name("name").or_else(|| caps.get(0)) else {
            continue;
        };
        if taken.iter().any(|r| r.start < m.end() && m.start() < r.end) {
            continue;
        }

        let mut kept: Vec<usize> = Vec::new();
        let hits = spans
            .iter()
            .enumerate()
            .filter(|(_, (start, end))| *start < m.end() && m.start() < *end);
        for (position, _) in hits {
            let token = &tokens[position];
            let keep = token.pos == "PROPN" || TRIM_PUNCT.contains(&token.text.as_str());
            if keep && kept.last().map_or(true, |last| *last + 1 == position) {
                kept.push(position);
            } else if !kept.is_empty() {
                break;
            }
        }
        let (Some(start), Some(last)) = (kept.first(), kept.last()) else {
            continue;
        };
        let range = trim_run(markup, *start..*last + 1);
        if range.is_empty() || runs.iter().any(|r| r.range.start < range.end && range.start < r.range.end) {
            continue;
        }

        let members: &[Token] = &tokens[range.clone()];
        let name = join_with_spans(members.iter().map(|t| t.text.as_str())).0;
        let case = members
            .iter()
            .find(|t| t.pos == "PROPN")
            .and_then(|t| t.feat("Case"))
            .map(str::to_string);
        runs.push(PatternRun { range, name, case });
    }
    runs
}

/// Registry ids for the placeholders that survived in the passage.
fn resolve_mapping(block: &MarkupBlock, ids: &BTreeMap<ElementKind, BTreeMap<usize, Uuid>>) -> ElementMapping {
    let mut mapping = ElementMapping::new();
    for markup in block {
        for token in markup {
            for (_, ph) in find_all(&token.text) {
                let Some(kind) = ph.kind.element_kind() else { continue };
                if let Some(id) = ids.get(&kind).and_then(|m| m.get(&ph.index)) {
                    mapping.entry(kind).or_default().insert(ph.index, *id);
                }
            }
        }
    }
    mapping
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::annotators::{EntityHint, PrecomputedAnnotations};

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&GenreProfile::literary_prose(), &PreprocessConfig::default()).unwrap()
    }

    /// Анна Сергеевна сказала .
    fn anna() -> MarkupBlock {
        MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 3, "nsubj", "Анна", "PROPN").with_feat("Case", "Nom"),
            Token::new(2, 1, "flat:name", "Сергеевна", "PROPN"),
            Token::new(3, 0, "root", "сказала", "VERB"),
            Token::new(4, 3, "punct", ".", "PUNCT"),
        ])])
    }

    #[test]
    fn test_pattern_pass_collapses_full_name() {
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&anna(), &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.text(), "<|PER_1|> сказала.");
        let root = outcome.block.markups()[0].root().unwrap();
        assert_eq!(root.text, "сказала");
        let id = outcome.elements[&ElementKind::Person][&1];
        assert_eq!(registry.find_by_id(&id).unwrap().name, "Анна Сергеевна");
    }

    #[test]
    fn test_pattern_pass_skips_non_proper_nouns() {
        // "Вчера" matches the capitalized-word pattern but is an adverb
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 2, "advmod", "Вчера", "ADV"),
            Token::new(2, 0, "root", "шёл", "VERB"),
            Token::new(3, 2, "nsubj", "снег", "NOUN"),
        ])]);
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.text(), "Вчера шёл снег");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_surname_resolves_across_passages() {
        let mut registry = Registry::default();
        let first = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 3, "nsubj", "Иван", "PROPN"),
            Token::new(2, 1, "flat:name", "Петров", "PROPN"),
            Token::new(3, 0, "root", "пришёл", "VERB"),
        ])]);
        let second = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 2, "nsubj", "Петров", "PROPN"),
            Token::new(2, 0, "root", "ушёл", "VERB"),
        ])]);
        let a = extractor().extract(&first, &mut registry, None, &mut Vec::new()).unwrap();
        let b = extractor().extract(&second, &mut registry, None, &mut Vec::new()).unwrap();
        assert_eq!(
            a.elements[&ElementKind::Person][&1],
            b.elements[&ElementKind::Person][&1]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_uses_registry() {
        let mut registry = Registry::default();
        registry
            .repo_mut(ElementKind::Location)
            .insert_or_update(StoryElement::new("Москва", ElementKind::Location, ExtractionOrigin::Manual));
        // tagged as a common noun, so only the sweep can catch it
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 0, "root", "Москва", "NOUN"),
            Token::new(2, 1, "amod", "спит", "VERB"),
        ])]);
        let outcome = extractor()
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.text(), "<|LOC_1|> спит");
        assert_eq!(registry.len(), 1);
        assert!(outcome.elements[&ElementKind::Location].contains_key(&1));
    }

    #[test]
    fn test_tagger_spans_and_adjacent_merge() {
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 0, "root", "Видели", "VERB"),
            Token::new(2, 1, "obj", "ООО", "NOUN"),
            Token::new(3, 2, "flat", "Ромашка", "NOUN"),
        ])]);
        let ner = PrecomputedAnnotations {
            entities: vec![EntityHint {
                text: "ООО Ромашка".into(),
                kind: ElementKind::Organization,
                normal: None,
            }],
            ..Default::default()
        };
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&block, &mut registry, Some(&ner), &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.text(), "Видели <|ORG_1|>");
        assert_eq!(registry.repo(ElementKind::Organization).len(), 1);
        assert_eq!(outcome.mentions[0].origin, ExtractionOrigin::Tagger);
    }

    #[test]
    fn test_adjacent_identical_mentions_merge() {
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 0, "root", "Пришли", "VERB"),
            Token::new(2, 1, "nsubj", "Анна", "PROPN"),
            Token::new(3, 2, "conj", "Анна", "PROPN"),
        ])]);
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        // two mentions resolve to one batch index, then merge
        assert_eq!(outcome.block.text(), "Пришли <|PER_1|>");
        outcome.block.validate().unwrap();
    }

    #[test]
    fn test_case_annotation() {
        let config = PreprocessConfig {
            annotate_case: true,
            ..Default::default()
        };
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 0, "root", "Видел", "VERB"),
            Token::new(2, 1, "obj", "Анну", "PROPN").with_feat("Case", "Acc"),
        ])]);
        let extractor = EntityExtractor::new(&config.profile, &config).unwrap();
        let mut registry = Registry::default();
        let outcome = extractor
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.text(), "Видел <|PER_1|><|C_Acc|>");
        assert!(outcome.elements[&ElementKind::Person].contains_key(&1));
    }

    #[test]
    fn test_surname_resolves_within_passage() {
        // Иван Петров пришёл . Петров ушёл .
        let block = MarkupBlock::new(vec![
            Markup::new(vec![
                Token::new(1, 3, "nsubj", "Иван", "PROPN"),
                Token::new(2, 1, "flat:name", "Петров", "PROPN"),
                Token::new(3, 0, "root", "пришёл", "VERB"),
                Token::new(4, 3, "punct", ".", "PUNCT"),
            ]),
            Markup::new(vec![
                Token::new(1, 2, "nsubj", "Петров", "PROPN"),
                Token::new(2, 0, "root", "ушёл", "VERB"),
                Token::new(3, 2, "punct", ".", "PUNCT"),
            ]),
        ]);
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.lines(), "<|PER_1|> пришёл.\n<|PER_1|> ушёл.");
        assert_eq!(outcome.elements[&ElementKind::Person].len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_text("Петров").unwrap().name, "Иван Петров");
    }

    #[test]
    fn test_line_anchored_pattern_matches_every_sentence() {
        let config = PreprocessConfig::with_profile(GenreProfile::russian_script());
        let extractor = EntityExtractor::new(&config.profile, &config).unwrap();
        let line = |speaker: &str, word: &str| {
            Markup::new(vec![
                Token::new(1, 3, "nsubj", speaker, "PROPN"),
                Token::new(2, 1, "punct", ":", "PUNCT"),
                Token::new(3, 0, "root", word, "INTJ"),
            ])
        };
        let block = MarkupBlock::new(vec![line("АННА", "Привет"), line("БОРИС", "Пока")]);
        let mut registry = Registry::default();
        let outcome = extractor
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.lines(), "<|PER_1|>: Привет\n<|PER_2|>: Пока");
        let mut names: Vec<_> = registry
            .repo(ElementKind::Person)
            .elements()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["АННА", "БОРИС"]);
    }

    #[test]
    fn test_matches_on_one_token_collapse_once() {
        // "Жан" and "Поль" both land on the single token "Жан-Поль"
        let block = MarkupBlock::new(vec![Markup::new(vec![
            Token::new(1, 2, "nsubj", "Жан-Поль", "PROPN"),
            Token::new(2, 0, "root", "пришёл", "VERB"),
        ])]);
        let mut registry = Registry::default();
        let outcome = extractor()
            .extract(&block, &mut registry, None, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.mentions.len(), 1);
        assert_eq!(outcome.mentions[0].surface, "Жан-Поль");
        assert_eq!(outcome.block.text(), "<|PER_1|> пришёл");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tagger_case_comes_from_collapsed_run() {
        let config = PreprocessConfig {
            annotate_case: true,
            ..Default::default()
        };
        let mut profile = config.profile.clone();
        profile.entity_patterns.clear();
        let extractor = EntityExtractor::new(&profile, &config).unwrap();
        // Работал в Сити . Москва Сити строится .
        let block = MarkupBlock::new(vec![
            Markup::new(vec![
                Token::new(1, 0, "root", "Работал", "VERB"),
                Token::new(2, 3, "case", "в", "ADP"),
                Token::new(3, 1, "obl", "Сити", "PROPN").with_feat("Case", "Loc"),
            ]),
            Markup::new(vec![
                Token::new(1, 3, "nsubj", "Москва", "PROPN").with_feat("Case", "Nom"),
                Token::new(2, 1, "flat", "Сити", "PROPN").with_feat("Case", "Nom"),
                Token::new(3, 0, "root", "строится", "VERB"),
            ]),
        ]);
        let ner = PrecomputedAnnotations {
            entities: vec![EntityHint {
                text: "Москва Сити".into(),
                kind: ElementKind::Organization,
                normal: None,
            }],
            ..Default::default()
        };
        let mut registry = Registry::default();
        let outcome = extractor
            .extract(&block, &mut registry, Some(&ner), &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.block.markups()[1].text(), "<|ORG_1|> строится");
    }
}
