//! Stable content-hash identifier for a selector.
use crate::ast::Selector;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fmt;

const PREFIX: &str = "s:";
const BODY_LEN: usize = 26;

/// A selector's stable content hash: `"s:"` followed by a 26-character
/// URL-safe-base64 truncation of `sha256(canonical_text)`.
///
/// Two selectors with identical canonical text have identical `Uid`;
/// the converse holds with overwhelming probability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uid(String);

impl Uid {
    /// Computes the UID of `selector`.
    ///
    /// # Panics
    ///
    /// Panics if `selector` contains a literal unrepresentable in
    /// canonical quoting; see [`Selector::try_canonical_text`].
    pub fn of(selector: &Selector) -> Uid {
        Uid::of_text(&selector.canonical_text())
    }

    /// Computes the UID directly from an already-canonical text form,
    /// without requiring a [`Selector`] value. Two selectors with the
    /// same canonical text always produce the same `Uid` via either
    /// entry point.
    pub fn of_text(canonical_text: &str) -> Uid {
        let digest = Sha256::digest(canonical_text.as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(digest);
        let body: String = encoded.chars().take(BODY_LEN).collect();
        Uid(format!("{PREFIX}{body}"))
    }

    /// The full UID text, e.g. `"s:5y5I3VdRZfDU01O--xXAPx2y"`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn format_shape() {
        let uid = Uid::of(&parse("").unwrap());
        assert_eq!(uid.as_str().len(), 28);
        assert!(uid.as_str().starts_with("s:"));
        assert!(uid.as_str()[2..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn equal_canonical_text_equal_uid() {
        let a = parse(r#"tier == "prod""#).unwrap();
        let b = parse(r#"tier=="prod""#).unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(Uid::of(&a), Uid::of(&b));
    }

    #[test]
    fn different_canonical_text_different_uid() {
        let a = Uid::of(&parse(r#"tier == "prod""#).unwrap());
        let b = Uid::of(&parse(r#"tier == "staging""#).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn deterministic_across_calls() {
        let tree = parse(r#"a == "b" || has(c)"#).unwrap();
        assert_eq!(Uid::of(&tree), Uid::of(&tree));
    }
}
