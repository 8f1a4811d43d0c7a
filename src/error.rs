//! Typed errors for caller-fault input shapes.
//!
//! Only malformed *shapes* are errors: a message entry without a usable id
//! cannot participate in provenance tracking, so compression refuses it up
//! front. Everything else (empty content, unusual roles, unknown metadata)
//! is accepted and passed through.

/// Errors surfaced to callers of [`compress`](crate::compress) and
/// [`uncompress`](crate::uncompress).
#[derive(Debug, thiserror::Error)]
pub enum CceError {
    /// A message entry has an empty `id`. Ids key the verbatim store and
    /// every provenance reference, so an empty id would make the rewrite
    /// irreversible.
    #[error("message at position {position} has an empty id")]
    MissingId {
        /// Zero-based position of the offending entry in the input sequence.
        position: usize,
    },
}
