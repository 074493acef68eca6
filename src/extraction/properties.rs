//! Entity properties read off the dependency tree.
//!
//! For every resolved entity placeholder the following become properties of
//! its registry element:
//! - `amod` / `appos` dependents ("старый", "врач")
//! - `xcomp` / `advcl` dependents of a `cop` dependent
//! - the governing verb when the entity is `nsubj` or `obj`, with that
//!   verb's `advmod` dependents ("ушёл", "быстро")
//! - `acl:relcl` clauses, as the clause's text
//!
//! The tree is left untouched.

use tracing::debug;

use super::entity::ElementMapping;
use super::placeholder::Placeholder;
use crate::elements::Registry;
use crate::markup::{join_with_spans, Markup, MarkupBlock, TokenId};

/// Property phrases per token in one sentence, keyed by entity token id.
pub fn collect(markup: &Markup) -> Vec<(TokenId, Vec<String>)> {
    let mut found = Vec::new();
    for token in markup {
        if Placeholder::parse(&token.text).is_none() {
            continue;
        }
        let mut props: Vec<String> = Vec::new();

        for rel in ["amod", "appos"] {
            props.extend(markup.children_with_rel(token.id, rel).map(|c| c.text.clone()));
        }
        for cop in markup.children_with_rel(token.id, "cop") {
            for rel in ["xcomp", "advcl"] {
                props.extend(markup.children_with_rel(cop.id, rel).map(|c| c.text.clone()));
            }
        }
        if token.rel == "nsubj" || token.rel == "obj" {
            if let Some(head) = markup.get(token.head_id).filter(|h| h.pos.starts_with('V')) {
                props.push(head.text.clone());
                props.extend(markup.children_with_rel(head.id, "advmod").map(|c| c.text.clone()));
            }
        }
        for clause in markup.children_with_rel(token.id, "acl:relcl") {
            let ids = markup.subtree(clause.id);
            let phrase = join_with_spans(
                ids.iter()
                    .filter_map(|id| markup.get(*id))
                    .map(|t| t.text.as_str()),
            )
            .0;
            props.push(phrase);
        }

        if !props.is_empty() {
            found.push((token.id, props));
        }
    }
    found
}

/// Attach collected properties to registry elements. Returns how many
/// properties were offered.
pub fn extract(block: &MarkupBlock, elements: &ElementMapping, registry: &mut Registry) -> usize {
    let mut offered = 0;
    for markup in block {
        for (token_id, props) in collect(markup) {
            let Some(ph) = markup.get(token_id).and_then(|t| Placeholder::parse(&t.text)) else {
                continue;
            };
            let Some(kind) = ph.kind.element_kind() else { continue };
            let Some(id) = elements.get(&kind).and_then(|m| m.get(&ph.index)) else {
                continue;
            };
            let Some(element) = registry.find_by_id_mut(id) else { continue };
            offered += props.len();
            for prop in props {
                element.add_property(prop);
            }
        }
    }
    if offered > 0 {
        debug!(offered, "entity properties recorded");
    }
    offered
}

// =============================================================================
// Tests
// =============================================================================
