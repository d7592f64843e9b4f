//! The selector expression tree and its canonical text form.
use std::collections::BTreeSet;
use std::fmt;

/// A parsed, canonical selector expression.
///
/// Two trees are equal (by [`PartialEq`]) iff they were built from the
/// same canonical text; use [`Selector::canonical_text`] /
/// [`Display`](fmt::Display) to obtain that text, and [`crate::Uid`] for
/// its stable content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Selector {
    /// Matches every label set.
    All,
    /// Matches label sets that contain the given key, with any value.
    Has(String),
    /// Matches label sets where `key` is present and equals `value`.
    Equal(String, String),
    /// Matches label sets where `key` is absent, or present with a
    /// value other than `value`.
    NotEqual(String, String),
    /// Matches label sets where `key` is present and its value is a
    /// member of `values`.
    In(String, Vec<String>),
    /// Matches label sets where `key` is absent, or present with a
    /// value that is not a member of `values`.
    NotIn(String, Vec<String>),
    /// Both sides must match.
    And(Box<Selector>, Box<Selector>),
    /// Either side must match.
    Or(Box<Selector>, Box<Selector>),
    /// The inner expression must not match.
    Not(Box<Selector>),
}

/// How a literal's quoting was chosen when printing canonical text.
///
/// Double-quoted when the value contains no `"`; single-quoted when
/// it contains `"` and no `'`. A value containing both is rejected at
/// canonicalisation time rather than guessing an escape convention.
fn quote_literal(value: &str) -> Result<String, QuoteError> {
    let has_double = value.contains('"');
    let has_single = value.contains('\'');
    match (has_double, has_single) {
        (false, _) => Ok(format!("\"{value}\"")),
        (true, false) => Ok(format!("'{value}'")),
        (true, true) => Err(QuoteError),
    }
}

/// A literal contains both `"` and `'`, so neither quoting style can
/// represent it without an escape convention the grammar does not
/// define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteError;

impl fmt::Display for QuoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "literal contains both '\"' and \"'\"; no escape convention is defined"
        )
    }
}

impl std::error::Error for QuoteError {}

impl Selector {
    /// The deterministic canonical text form of this tree.
    ///
    /// `parse(tree.canonical_text()).canonical_text() ==
    /// tree.canonical_text()` for every tree the parser can produce.
    ///
    /// # Panics
    ///
    /// Panics if a literal contains both `"` and `'`. That case can
    /// only be reached if a tree was constructed by hand rather than
    /// via [`crate::parse`], since the parser rejects such literals.
    /// Use [`Selector::try_canonical_text`] to handle it without
    /// panicking.
    pub fn canonical_text(&self) -> String {
        self.try_canonical_text()
            .expect("selector literal unrepresentable in canonical quoting")
    }

    /// Fallible counterpart of [`Selector::canonical_text`].
    pub fn try_canonical_text(&self) -> Result<String, QuoteError> {
        let mut out = String::new();
        self.write_canonical(&mut out, 0)?;
        Ok(out)
    }

    /// The union, over every leaf of this tree, of the label keys it
    /// inspects.
    pub fn referenced_labels(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_labels(&mut out);
        out
    }

    fn collect_labels<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Selector::All => {}
            Selector::Has(k) | Selector::Equal(k, _) | Selector::NotEqual(k, _) => {
                out.insert(k.as_str());
            }
            Selector::In(k, _) | Selector::NotIn(k, _) => {
                out.insert(k.as_str());
            }
            Selector::And(a, b) | Selector::Or(a, b) => {
                a.collect_labels(out);
                b.collect_labels(out);
            }
            Selector::Not(e) => e.collect_labels(out),
        }
    }

    /// Precedence class, highest-binding first: `Not` binds tighter
    /// than `in`/`==`/`!=`; `&&` binds tighter than `||`.
    fn precedence(&self) -> u8 {
        match self {
            Selector::Or(..) => 0,
            Selector::And(..) => 1,
            Selector::Not(_) => 2,
            _ => 3,
        }
    }

    fn write_canonical(&self, out: &mut String, min_prec: u8) -> Result<(), QuoteError> {
        let needs_parens = self.precedence() < min_prec;
        if needs_parens {
            out.push('(');
        }
        match self {
            Selector::All => out.push_str("all()"),
            Selector::Has(k) => {
                out.push_str("has(");
                out.push_str(k);
                out.push(')');
            }
            Selector::Equal(k, v) => {
                out.push_str(k);
                out.push_str(" == ");
                out.push_str(&quote_literal(v)?);
            }
            Selector::NotEqual(k, v) => {
                out.push_str(k);
                out.push_str(" != ");
                out.push_str(&quote_literal(v)?);
            }
            Selector::In(k, vs) => {
                out.push_str(k);
                out.push_str(" in {");
                write_literal_set(out, vs)?;
                out.push('}');
            }
            Selector::NotIn(k, vs) => {
                out.push_str(k);
                out.push_str(" not in {");
                write_literal_set(out, vs)?;
                out.push('}');
            }
            Selector::Not(e) => {
                out.push('!');
                // `!` binds tighter than everything except another `!`;
                // parenthesise compound (And/Or) inner expressions.
                e.write_canonical(out, 2)?;
            }
            Selector::And(a, b) => {
                a.write_canonical(out, 1)?;
                out.push_str(" && ");
                b.write_canonical(out, 1)?;
            }
            Selector::Or(a, b) => {
                a.write_canonical(out, 0)?;
                out.push_str(" || ");
                b.write_canonical(out, 0)?;
            }
        }
        if needs_parens {
            out.push(')');
        }
        Ok(())
    }
}

fn write_literal_set(out: &mut String, values: &[String]) -> Result<(), QuoteError> {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&quote_literal(v)?);
    }
    Ok(())
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.canonical_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn all_prints_all() {
        assert_eq!(Selector::All.to_string(), "all()");
    }

    #[test]
    fn not_of_compound_is_parenthesised() {
        let tree = Selector::Not(Box::new(Selector::Or(
            Box::new(Selector::Has("b".into())),
            Box::new(Selector::Not(Box::new(Selector::Has("a".into())))),
        )));
        assert_eq!(tree.to_string(), "!(has(b) || !has(a))");
    }

    #[test]
    fn seed_scenario_1() {
        let tree = parse(" ! (has( b)||! has(a ))").unwrap();
        assert_eq!(tree.to_string(), "!(has(b) || !has(a))");
    }

    #[test]
    fn and_inside_or_is_not_parenthesised() {
        let tree = Selector::Or(
            Box::new(Selector::Has("a".into())),
            Box::new(Selector::And(
                Box::new(Selector::Has("b".into())),
                Box::new(Selector::Has("c".into())),
            )),
        );
        assert_eq!(tree.to_string(), "has(a) || has(b) && has(c)");
    }

    #[test]
    fn or_inside_and_is_parenthesised() {
        let tree = Selector::And(
            Box::new(Selector::Has("a".into())),
            Box::new(Selector::Or(
                Box::new(Selector::Has("b".into())),
                Box::new(Selector::Has("c".into())),
            )),
        );
        assert_eq!(tree.to_string(), "has(a) && (has(b) || has(c))");
    }

    #[test]
    fn referenced_labels_union_over_leaves() {
        let tree = parse(r#"a == "x" && (b in {"y"} || has(c))"#).unwrap();
        let labels: Vec<&str> = tree.referenced_labels().into_iter().collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn ambiguous_quoting_rejected() {
        let tree = Selector::Equal("k".into(), "a\"b'c".into());
        assert!(tree.try_canonical_text().is_err());
    }
}
