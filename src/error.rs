//! Parser error type.
use std::fmt;

/// A selector string failed to parse.
///
/// Carries the byte offset of the offending token and a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset into the input at which the error was detected.
    pub pos: usize,
    /// Human-readable description of what went wrong.
    pub msg: String,
}

impl SyntaxError {
    pub(crate) fn new(pos: usize, msg: impl Into<String>) -> Self {
        SyntaxError { pos, msg: msg.into() }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "syntax error at byte {}: {}", self.pos, self.msg)
    }
}

impl std::error::Error for SyntaxError {}
