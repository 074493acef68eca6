//! Cross-stage tests: structural edits chained the way the preprocessor
//! chains them, checking tree invariants after every step.

use super::*;

fn assert_contiguous(markup: &Markup) {
    for (idx, token) in markup.iter().enumerate() {
        assert_eq!(token.id, idx + 1);
        assert!(token.head_id == ROOT_HEAD || token.head_id <= markup.len());
    }
    markup.validate().unwrap();
}

/// Иван Петров встретил Анну Сергеевну 12.05.2020 в Москве .
fn meeting() -> Markup {
    Markup::new(vec![
        Token::new(1, 3, "nsubj", "Иван", "PROPN").with_feat("Case", "Nom"),
        Token::new(2, 1, "flat:name", "Петров", "PROPN"),
        Token::new(3, 0, "root", "встретил", "VERB")
            .with_feat("Aspect", "Perf")
            .with_feat("Tense", "Past"),
        Token::new(4, 3, "obj", "Анну", "PROPN").with_feat("Case", "Acc"),
        Token::new(5, 4, "flat:name", "Сергеевну", "PROPN"),
        Token::new(6, 3, "obl", "12.05.2020", "NUM"),
        Token::new(7, 8, "case", "в", "ADP"),
        Token::new(8, 3, "obl", "Москве", "PROPN"),
        Token::new(9, 3, "punct", ".", "PUNCT"),
    ])
}

#[test]
fn test_chained_collapses_keep_invariants() {
    let mut markup = meeting();
    let edits = [
        ("12.05.2020", "<|DATETIME_1|>", MatchCase::Sensitive),
        ("Иван Петров", "<|PER_1|>", MatchCase::Insensitive),
        ("Анну Сергеевну", "<|PER_2|>", MatchCase::Insensitive),
        ("Москве", "<|LOC_1|>", MatchCase::Insensitive),
    ];
    let mut expected_len = markup.len();
    for (phrase, placeholder, case) in edits {
        let before = find_run(&markup, phrase, case).unwrap();
        markup = collapse_phrase(&markup, phrase, placeholder, case)
            .unwrap()
            .unwrap();
        expected_len -= before.len() - 1;
        assert_eq!(markup.len(), expected_len);
        assert_contiguous(&markup);
    }
    assert_eq!(
        markup.text(),
        "<|PER_1|> встретил <|PER_2|> <|DATETIME_1|> в <|LOC_1|>."
    );

    let reordered = rearrange(&markup).unwrap();
    assert_contiguous(&reordered);
    assert_eq!(
        reordered.text(),
        "встретил <|PER_1|> <|PER_2|> <|DATETIME_1|> <|LOC_1|> в."
    );
    assert_eq!(classify(&reordered), EventType::Dynamic);
}

#[test]
fn test_rearrange_is_stable_on_canonical_order() {
    let once = rearrange(&meeting()).unwrap();
    let twice = rearrange(&once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_block_pipeline_snapshots_are_independent() {
    let block = MarkupBlock::new(vec![meeting()]);
    let collapsed = block
        .try_map(|m| Ok(collapse_phrase(m, "Москве", "<|LOC_1|>", MatchCase::Sensitive)?.unwrap_or_else(|| m.clone())))
        .unwrap();
    assert_eq!(block.token_count(), 9);
    assert_eq!(collapsed.token_count(), 9);
    assert!(collapsed.text().contains("<|LOC_1|>"));
    assert!(!block.text().contains("<|LOC_1|>"));
}
