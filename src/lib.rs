//! Lossless, reversible compression for LLM conversation context.
//!
//! Older prose turns shrink into deterministic summaries while code,
//! structured data, secrets, and recent turns pass through verbatim. Every
//! rewrite is reversible: the compressor emits a replacement sequence plus
//! a verbatim side-store, and [`uncompress`] restores the original sequence
//! byte-for-byte from them.
//!
//! # Pipeline
//!
//! 1. **Classification** — each message gets a tier and preservation
//!    reasons. Code, JSON/YAML, SQL, API keys, math, and verse are hard
//!    preserves; recent turns and protected roles never compress.
//! 2. **Deduplication** — exact duplicates (djb2 + byte equality) and,
//!    opt-in, fuzzy near-duplicates (line fingerprints + Jaccard) collapse
//!    into short references to a surviving keep target.
//! 3. **Grouping & summarization** — consecutive same-role compressible
//!    messages merge and shrink through a deterministic sentence scorer;
//!    messages mixing prose with fenced code keep the fences byte-identical
//!    and summarize only the prose.
//! 4. **Size guard & provenance** — any rewrite not strictly shorter than
//!    its source is abandoned; surviving rewrites carry `_cce_original`
//!    metadata and their originals land in the verbatim store.
//! 5. **Budget search** (optional) — binary search over the recency window
//!    to meet a token budget, with an opt-in force-converge truncation
//!    pass when even the floor window cannot fit.
//!
//! # Usage
//!
//! ```ignore
//! use cce::{compress, uncompress, CompressOptions, UncompressOptions, VerbatimStore};
//!
//! let result = compress(&messages, &CompressOptions::default())?;
//! // ... persist result.messages and result.verbatim together ...
//! let restored = uncompress(
//!     &result.messages,
//!     &VerbatimStore::Map(&result.verbatim),
//!     &UncompressOptions::default(),
//! )?;
//! assert_eq!(restored.messages, messages);
//! ```
//!
//! An external LLM summarizer can replace the deterministic one through
//! [`compress_with_summarizer`]; its output is only accepted when shorter
//! than the input and every failure falls back to the deterministic path,
//! so the round-trip guarantees hold either way.

mod budget;
mod classify;
mod decompress;
mod dedup;
mod error;
mod hash;
mod llm;
mod message;
mod pipeline;
mod split;
mod summarize;

pub use budget::default_token_counter;
pub use decompress::{uncompress, UncompressOptions, UncompressResult, VerbatimStore};
pub use error::CceError;
pub use llm::{make_escalating_summarizer, make_summarizer, Summarizer, SummarizerOptions};
pub use message::{Message, Provenance, VerbatimMap, PROVENANCE_KEY};
pub use pipeline::{
    compress, compress_with_summarizer, CompressOptions, CompressResult, CompressionStats,
    TokenCounter,
};
