//! Event-type classification by dynamic/static evidence scoring.
//!
//! | evidence                                          | dynamic | static |
//! |---------------------------------------------------|---------|--------|
//! | root POS in VERB/AUX                              | +2      |        |
//! | root POS in NOUN/PROPN/ADJ/ADV                    |         | +2     |
//! | token with a dynamic relation                     | +1      |        |
//! | token with a static relation                      |         | +1     |
//! | Aspect=Perf, Tense=Past/Fut, Mood=Imp, Voice=Pass | +1 each |        |

use serde::{Deserialize, Serialize};

use super::block::{EventType, Markup, MarkupBlock};

pub const DYNAMIC_POS: [&str; 2] = ["VERB", "AUX"];
pub const STATIC_POS: [&str; 4] = ["NOUN", "PROPN", "ADJ", "ADV"];

pub const DYNAMIC_RELS: [&str; 9] = [
    "nsubj", "csubj", "obj", "iobj", "xcomp", "ccomp", "advcl", "advmod", "obl",
];
pub const STATIC_RELS: [&str; 4] = ["cop", "amod", "compound", "nmod"];

/// Raw evidence totals for one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventScores {
    pub dynamic: u32,
    pub static_: u32,
}

fn dynamic_feature_hits(token: &crate::markup::Token) -> u32 {
    let checks = [
        token.feat("Aspect") == Some("Perf"),
        matches!(token.feat("Tense"), Some("Past") | Some("Fut")),
        token.feat("Mood") == Some("Imp"),
        token.feat("Voice") == Some("Pass"),
    ];
    checks.iter().filter(|hit| **hit).count() as u32
}

pub fn score(markup: &Markup) -> EventScores {
    let mut scores = EventScores::default();

    if let Some(root) = markup.root() {
        if DYNAMIC_POS.contains(&root.pos.as_str()) {
            scores.dynamic += 2;
        } else if STATIC_POS.contains(&root.pos.as_str()) {
            scores.static_ += 2;
        }
    }

    for token in markup {
        if DYNAMIC_RELS.contains(&token.rel.as_str()) {
            scores.dynamic += 1;
        } else if STATIC_RELS.contains(&token.rel.as_str()) {
            scores.static_ += 1;
        }
        scores.dynamic += dynamic_feature_hits(token);
    }
    scores
}

/// Decision threshold: short sentences need less evidence.
pub fn threshold(len: usize) -> u32 {
    if len < 3 {
        1
    } else {
        2
    }
}

pub fn decide(scores: EventScores, threshold: u32) -> EventType {
    let EventScores { dynamic, static_ } = scores;
    if dynamic > threshold && static_ > threshold {
        EventType::Mixed
    } else if dynamic > threshold {
        EventType::Dynamic
    } else if static_ > threshold {
        EventType::Static
    } else {
        EventType::Unknown
    }
}

pub fn classify(markup: &Markup) -> EventType {
    decide(score(markup), threshold(markup.len()))
}

/// Annotate every sentence of a passage with its event type.
pub fn classify_block(block: &MarkupBlock) -> MarkupBlock {
    MarkupBlock::new(
        block
            .iter()
            .map(|m| m.clone().with_event_type(classify(m)))
            .collect(),
    )
}

// =============================================================================
// Tests
// =============================================================================
