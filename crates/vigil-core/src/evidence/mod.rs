//! Evidence registry: derived and manually attached compliance evidence,
//! plus the reviewer workflow over it.
//!
//! # Review status normalization
//!
//! Derived evidence is written with no review status. Every reader maps a
//! missing, empty or unrecognized status to [`ReviewStatus::Pending`]. Rust
//! code goes through [`ReviewStatus::from_stored`] and SQL aggregation
//! embeds the equivalent `CASE` expression from this module, so listing and
//! summarizing cannot disagree about a row.

mod record;
mod registry;

#[cfg(test)]
mod tests;

pub use record::{EvidenceRecord, ManualEvidence, ReviewDecision, ReviewStatus};
pub(crate) use record::NORMALIZED_REVIEW_STATUS_SQL;
pub use registry::EvidenceRegistry;
