//! Error types for on-wire key encoding and unrecoverable internal
//! failures.
use std::fmt;

/// A key could not be encoded onto its wire path because a required
/// identifier was empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireKeyError {
    pub field: &'static str,
}

impl WireKeyError {
    pub(crate) fn insufficient(field: &'static str) -> Self {
        WireKeyError { field }
    }
}

impl fmt::Display for WireKeyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "insufficient identifiers: `{}` is empty", self.field)
    }
}

impl std::error::Error for WireKeyError {}

/// Aborts the process, logging first.
///
/// Covers a small number of conditions treated as programmer error: a
/// policy selector that fails to parse after having already been
/// admitted (validation is assumed to happen upstream of the
/// calculator), and serialisation failure of an already-validated
/// payload. Both indicate the calculator's invariants have been
/// violated by its caller, not a recoverable runtime condition, so
/// there is nothing productive to return a `Result` to.
pub(crate) fn fatal(msg: impl fmt::Display) -> ! {
    tracing::error!("internal invariant violated: {msg}");
    panic!("internal invariant violated: {msg}");
}
