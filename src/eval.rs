//! Selector evaluation against a label mapping.
use crate::ast::Selector;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Evaluate `tree` against `labels`, short-circuiting and side-effect
/// free.
///
/// `NotEqual`/`NotIn` treat an absent key as satisfied: a key that
/// isn't there trivially differs from any value and belongs to no set.
pub fn evaluate<K, V, S>(tree: &Selector, labels: &HashMap<K, V, S>) -> bool
where
    K: Borrow<str> + Eq + Hash,
    V: Borrow<str>,
    S: std::hash::BuildHasher,
{
    match tree {
        Selector::All => true,
        Selector::Has(key) => labels.get(key.as_str()).is_some(),
        Selector::Equal(key, value) => {
            labels.get(key.as_str()).map(|v| -> &str { v.borrow() }) == Some(value.as_str())
        }
        Selector::NotEqual(key, value) => {
            labels.get(key.as_str()).map(|v| -> &str { v.borrow() }) != Some(value.as_str())
        }
        Selector::In(key, values) => labels
            .get(key.as_str())
            .map(|v| {
                let v: &str = v.borrow();
                values.iter().any(|candidate| candidate.as_str() == v)
            })
            .unwrap_or(false),
        Selector::NotIn(key, values) => !labels
            .get(key.as_str())
            .map(|v| {
                let v: &str = v.borrow();
                values.iter().any(|candidate| candidate.as_str() == v)
            })
            .unwrap_or(false),
        Selector::And(a, b) => evaluate(a, labels) && evaluate(b, labels),
        Selector::Or(a, b) => evaluate(a, labels) || evaluate(b, labels),
        Selector::Not(e) => !evaluate(e, labels),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn seed_scenario_3() {
        let tree = parse(r#"a == "b" && c == "d""#).unwrap();
        assert!(evaluate(&tree, &labels(&[("a", "b"), ("c", "d")])));
        assert!(!evaluate(&tree, &labels(&[("a", "b")])));
        assert!(!evaluate(&tree, &labels(&[("c", "d")])));
        assert!(!evaluate(&tree, &labels(&[])));
    }

    #[test]
    fn not_equal_true_on_absence() {
        let tree = parse(r#"tier != "prod""#).unwrap();
        assert!(evaluate(&tree, &labels(&[])));
        assert!(!evaluate(&tree, &labels(&[("tier", "prod")])));
        assert!(evaluate(&tree, &labels(&[("tier", "dev")])));
    }

    #[test]
    fn empty_in_set_matches_nothing() {
        let tree = parse(r#"tier in {}"#).unwrap();
        assert!(!evaluate(&tree, &labels(&[("tier", "prod")])));
        assert!(!evaluate(&tree, &labels(&[])));
    }

    #[test]
    fn not_in_empty_set_matches_everything() {
        let tree = parse(r#"tier not in {}"#).unwrap();
        assert!(evaluate(&tree, &labels(&[("tier", "prod")])));
        assert!(evaluate(&tree, &labels(&[])));
    }

    #[test]
    fn evaluation_stable_through_reprint() {
        let tree = parse(r#"! (has( b)||! has(a ))"#).unwrap();
        let reprinted = parse(&tree.to_string()).unwrap();
        let l = labels(&[("a", "1")]);
        assert_eq!(evaluate(&tree, &l), evaluate(&reprinted, &l));
    }

    #[test]
    fn works_with_btreemap_too() {
        let tree = parse(r#"role == "db""#).unwrap();
        let mut m: BTreeMap<String, String> = BTreeMap::new();
        m.insert("role".to_string(), "db".to_string());
        // evaluate() is generic over HashMap; BTreeMap-backed effective
        // label maps are converted at the call site (see policy-index).
        let hm: HashMap<String, String> = m.into_iter().collect();
        assert!(evaluate(&tree, &hm));
    }
}
