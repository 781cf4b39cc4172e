//! Pattern cache entries and the similarity math behind lookups.

mod entry;
mod similarity;

pub use entry::PatternEntry;
pub use similarity::{adjusted_confidence, cosine_similarity, ranking_weight};
