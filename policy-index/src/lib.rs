//! Label-inheritance index and endpoint→profile-ID multiset: the join
//! between registered selectors and the endpoints they match,
//! including labels inherited from referenced profiles.

mod inheritance;
mod multiset;

pub use inheritance::{LabelIndex, MatchListener};
pub use multiset::ProfileMultiset;
