#![allow(clippy::type_complexity)]
//! Parser, canonicaliser, content-hasher and evaluator for the
//! network-policy label-selector grammar.
//!
//! A selector is a small boolean expression over endpoint labels:
//! equality, membership, existence and the usual boolean combinators.
//! Selectors are parsed into a canonical tree, printed back to a
//! deterministic text form, content-hashed into a stable [`Uid`], and
//! evaluated against a label mapping.
//!
//! # Example
//!
//! ```rust
//! use policy_selectors::{parse, evaluate};
//! use std::collections::HashMap;
//!
//! let tree = parse(r#"tier == "prod" && !has(canary)"#).unwrap();
//! let mut labels = HashMap::new();
//! labels.insert("tier".to_string(), "prod".to_string());
//! assert!(evaluate(&tree, &labels));
//! ```

mod ast;
mod error;
mod eval;
mod lex;
mod parser;
#[cfg(test)]
mod proptests;
mod uid;

pub use ast::Selector;
pub use error::SyntaxError;
pub use eval::evaluate;
pub use parser::parse;
pub use uid::Uid;
