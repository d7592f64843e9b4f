//! Property tests for two invariants quantified over every selector
//! the parser accepts: round-trip canonical form and evaluation
//! stability. Generated trees are kept small and shallow rather than
//! exhaustively enumerated.
use crate::{evaluate, parse, Selector};
use proptest::prelude::*;
use std::collections::HashMap;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}".prop_filter("not reserved", |s| {
        !matches!(s.as_str(), "has" | "in" | "not" | "all")
    })
}

fn literal() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{0,6}"
}

fn selector_tree() -> impl Strategy<Value = Selector> {
    let leaf = prop_oneof![
        Just(Selector::All),
        ident().prop_map(Selector::Has),
        (ident(), literal()).prop_map(|(k, v)| Selector::Equal(k, v)),
        (ident(), literal()).prop_map(|(k, v)| Selector::NotEqual(k, v)),
        (ident(), prop::collection::vec(literal(), 0..3))
            .prop_map(|(k, vs)| Selector::In(k, vs)),
        (ident(), prop::collection::vec(literal(), 0..3))
            .prop_map(|(k, vs)| Selector::NotIn(k, vs)),
    ];

    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Selector::Not(Box::new(e))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Selector::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Selector::Or(Box::new(a), Box::new(b))),
        ]
    })
}

fn label_map() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map(ident(), literal(), 0..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn round_trip_canonical_form(tree in selector_tree()) {
        let text = tree.canonical_text();
        let reparsed = parse(&text).expect("canonical text must reparse");
        prop_assert_eq!(reparsed.canonical_text(), text);
    }

    #[test]
    fn evaluation_stable_through_reprint(tree in selector_tree(), labels in label_map()) {
        let text = tree.canonical_text();
        let reparsed = parse(&text).unwrap();
        prop_assert_eq!(evaluate(&tree, &labels), evaluate(&reparsed, &labels));
    }
}
