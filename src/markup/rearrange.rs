//! Canonical token order by dependency traversal.
//!
//! Tokens are emitted in pre-order from each root, visiting children by
//! relation priority (subject before object before obliques ... punctuation
//! last) and then by original id. Cycles are broken first so the traversal
//! always terminates. Traversal uses an explicit stack, so arbitrarily deep
//! trees are safe.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::block::{Markup, MarkupBlock};
use super::token::{renumber, Token, TokenId, ROOT_HEAD};
use crate::error::{PreprocessError, Result};

/// Relation labels in traversal priority order. Anything else ranks last.
pub const RELATION_PRIORITY: [&str; 13] = [
    "root", "nsubj", "obj", "iobj", "ccomp", "xcomp", "obl", "advmod", "amod", "det", "case",
    "mark", "punct",
];

/// Priority of a relation label; lower is visited first.
pub fn relation_rank(rel: &str) -> usize {
    RELATION_PRIORITY
        .iter()
        .position(|r| *r == rel)
        .unwrap_or(RELATION_PRIORITY.len())
}

/// Detach self-loops and break every head cycle by zeroing the head of the
/// cycle member with the smallest id. Returns the number of edges removed.
///
/// Each token is walked once: a walk stops at any token already settled by
/// an earlier walk.
pub fn break_cycles(tokens: &mut [Token]) -> usize {
    let mut broken = 0;
    for token in tokens.iter_mut() {
        if token.head_id == token.id && token.id != ROOT_HEAD {
            token.head_id = ROOT_HEAD;
            broken += 1;
        }
    }

    let index: HashMap<TokenId, usize> = tokens.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    let mut settled: HashSet<TokenId> = HashSet::with_capacity(tokens.len());

    for start in 0..tokens.len() {
        let mut path: Vec<TokenId> = Vec::new();
        let mut on_path: HashMap<TokenId, usize> = HashMap::new();
        let mut current = tokens[start].id;
        while !settled.contains(&current) {
            if let Some(&at) = on_path.get(&current) {
                let weakest = path[at..].iter().copied().min().unwrap_or(current);
                tokens[index[&weakest]].head_id = ROOT_HEAD;
                broken += 1;
                break;
            }
            on_path.insert(current, path.len());
            path.push(current);
            let head = tokens[index[&current]].head_id;
            if head == ROOT_HEAD || !index.contains_key(&head) {
                break;
            }
            current = head;
        }
        settled.extend(path);
    }
    broken
}

/// Reorder one sentence into canonical traversal order.
pub fn rearrange(markup: &Markup) -> Result<Markup> {
    let mut tokens: Vec<Token> = markup.tokens().to_vec();
    let broken = break_cycles(&mut tokens);
    if broken > 0 {
        debug!(broken, "broke dependency cycles before reordering");
    }

    let index: HashMap<TokenId, usize> = tokens.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    let priority = |id: &TokenId| {
        let token = &tokens[index[id]];
        (relation_rank(&token.rel), token.id)
    };

    let mut children: HashMap<TokenId, Vec<TokenId>> = HashMap::new();
    for token in &tokens {
        if index.contains_key(&token.head_id) {
            children.entry(token.head_id).or_default().push(token.id);
        }
    }
    for list in children.values_mut() {
        list.sort_by_key(priority);
    }

    let mut roots: Vec<TokenId> = tokens.iter().filter(|t| t.is_root()).map(|t| t.id).collect();
    if roots.is_empty() {
        roots = tokens
            .iter()
            .filter(|t| !index.contains_key(&t.head_id))
            .map(|t| t.id)
            .collect();
    }
    if roots.is_empty() {
        roots.extend(tokens.iter().map(|t| t.id).min());
    }
    roots.sort_by_key(priority);

    let mut visited: HashSet<TokenId> = HashSet::with_capacity(tokens.len());
    let mut order: Vec<TokenId> = Vec::with_capacity(tokens.len());
    let walk = |start: TokenId, visited: &mut HashSet<TokenId>, order: &mut Vec<TokenId>| {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().rev().copied().filter(|k| !visited.contains(k)));
            }
        }
    };

    for root in roots {
        walk(root, &mut visited, &mut order);
    }
    let mut leftovers: Vec<TokenId> = tokens.iter().map(|t| t.id).filter(|id| !visited.contains(id)).collect();
    leftovers.sort_unstable();
    for id in leftovers {
        walk(id, &mut visited, &mut order);
    }

    let reordered: Vec<Token> = order.iter().map(|id| tokens[index[id]].clone()).collect();
    if reordered.len() != markup.len() {
        return Err(PreprocessError::consistency(
            "rearrange",
            format!("{} tokens in, {} out", markup.len(), reordered.len()),
        ));
    }
    Ok(markup.with_tokens(renumber(reordered)))
}

/// Reorder every sentence of a passage.
pub fn rearrange_block(block: &MarkupBlock) -> Result<MarkupBlock> {
    block.try_map(rearrange)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn words(markup: &Markup) -> Vec<&str> {
        markup.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_relation_rank() {
        assert_eq!(relation_rank("root"), 0);
        assert_eq!(relation_rank("punct"), 12);
        assert_eq!(relation_rank("conj"), 13);
        assert_eq!(relation_rank("nsubj:pass"), 13);
    }

    #[test]
    fn test_priority_order() {
        // Вчера Анна дала брату книгу .
        let markup = Markup::new(vec![
            Token::new(1, 3, "advmod", "Вчера", "ADV"),
            Token::new(2, 3, "nsubj", "Анна", "PROPN"),
            Token::new(3, 0, "root", "дала", "VERB"),
            Token::new(4, 3, "iobj", "брату", "NOUN"),
            Token::new(5, 3, "obj", "книгу", "NOUN"),
            Token::new(6, 3, "punct", ".", "PUNCT"),
        ]);
        let out = rearrange(&markup).unwrap();
        assert_eq!(words(&out), vec!["дала", "Анна", "книгу", "брату", "Вчера", "."]);
        out.validate().unwrap();
        assert_eq!(out.get(2).unwrap().head_id, 1);
    }

    #[test]
    fn test_nested_preorder() {
        let markup = Markup::new(vec![
            Token::new(1, 2, "amod", "старый", "ADJ"),
            Token::new(2, 3, "nsubj", "кот", "NOUN"),
            Token::new(3, 0, "root", "спал", "VERB"),
            Token::new(4, 5, "case", "на", "ADP"),
            Token::new(5, 3, "obl", "печи", "NOUN"),
        ]);
        let out = rearrange(&markup).unwrap();
        assert_eq!(words(&out), vec!["спал", "кот", "старый", "печи", "на"]);
    }

    #[test]
    fn test_cycle_breaks_exactly_one_edge() {
        for k in 2..6 {
            // 1 → 2 → ... → k → 1
            let mut tokens: Vec<Token> = (1..=k)
                .map(|id| Token::new(id, if id == k { 1 } else { id + 1 }, "dep", format!("w{}", id), "X"))
                .collect();
            assert_eq!(break_cycles(&mut tokens), 1);
            assert_eq!(tokens.iter().filter(|t| t.is_root()).count(), 1);
            assert!(tokens[0].is_root());

            let markup = Markup::new(
                (1..=k)
                    .map(|id| Token::new(id, if id == k { 1 } else { id + 1 }, "dep", format!("w{}", id), "X"))
                    .collect(),
            );
            let out = rearrange(&markup).unwrap();
            assert_eq!(out.len(), k);
            out.validate().unwrap();
        }
    }

    #[test]
    fn test_self_loop_detached() {
        let markup = Markup::new(vec![
            Token::new(1, 1, "root", "Стоп", "VERB"),
            Token::new(2, 1, "punct", "!", "PUNCT"),
        ]);
        let out = rearrange(&markup).unwrap();
        assert_eq!(words(&out), vec!["Стоп", "!"]);
        out.validate().unwrap();
    }

    #[test]
    fn test_dangling_heads_become_roots() {
        let markup = Markup::new(vec![
            Token::new(1, 7, "nsubj", "он", "PRON"),
            Token::new(2, 1, "punct", ".", "PUNCT"),
        ]);
        let out = rearrange(&markup).unwrap();
        assert_eq!(words(&out), vec!["он", "."]);
        assert!(out.get(1).unwrap().is_root());
        out.validate().unwrap();
    }

    #[test]
    fn test_chain_into_cycle_breaks_once() {
        // 4 → 1 → 2 ⇄ 3
        let mut tokens = vec![
            Token::new(1, 2, "dep", "a", "X"),
            Token::new(2, 3, "dep", "b", "X"),
            Token::new(3, 2, "dep", "c", "X"),
            Token::new(4, 1, "dep", "d", "X"),
        ];
        assert_eq!(break_cycles(&mut tokens), 1);
        assert!(tokens[1].is_root());
        assert_eq!(tokens[2].head_id, 2);
        assert_eq!(tokens[3].head_id, 1);
    }

    #[test]
    fn test_long_cycle_breaks_once() {
        let n = 20_000;
        let mut tokens: Vec<Token> = (1..=n)
            .map(|id| Token::new(id, if id == 1 { n } else { id - 1 }, "dep", "x", "X"))
            .collect();
        assert_eq!(break_cycles(&mut tokens), 1);
        assert!(tokens[0].is_root());
    }

    #[test]
    fn test_deep_chain_without_recursion() {
        let n = 5_000;
        let markup = Markup::new(
            (1..=n)
                .map(|id| Token::new(id, id - 1, "dep", "x", "X"))
                .collect(),
        );
        let out = rearrange(&markup).unwrap();
        assert_eq!(out.len(), n);
        out.validate().unwrap();
    }

    #[test]
    fn test_block_preserves_token_count() {
        let a = Markup::new(vec![
            Token::new(1, 2, "nsubj", "Я", "PRON"),
            Token::new(2, 0, "root", "иду", "VERB"),
        ]);
        let block = MarkupBlock::new(vec![a.clone(), a]);
        let out = rearrange_block(&block).unwrap();
        assert_eq!(out.token_count(), 4);
        assert_eq!(out.lines(), "иду Я\nиду Я");
    }
}
