//! The message record, provenance metadata, and the verbatim side-store.
//!
//! Messages are heterogeneous records owned by the caller: a handful of
//! typed fields the compressor understands, an open `metadata` map, and a
//! flattened `extra` map so unknown sibling fields survive a round trip
//! byte-for-byte. The compressor never invents or drops fields; it only
//! rewrites `content` and inserts provenance under the reserved metadata
//! key [`PROVENANCE_KEY`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved metadata key carrying [`Provenance`] on rewritten messages.
pub const PROVENANCE_KEY: &str = "_cce_original";

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, unique within the sequence. The only key the
    /// verbatim store and provenance references use.
    pub id: String,
    /// Position tag supplied by the caller. Passed through untouched; the
    /// pipeline orders by sequence position, not by this field.
    #[serde(default)]
    pub index: u64,
    /// Conversation role (`system`, `user`, `assistant`, `tool`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Turn text. May be empty or absent (e.g. pure tool-call turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Opaque tool invocations. Presence (non-empty) forces preservation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    /// Open metadata map. `_cce_original` is the one reserved key.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Unknown sibling fields, preserved on pass-through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Convenience constructor for the common id/role/content case.
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            index: 0,
            role: Some(role.into()),
            content: Some(content.into()),
            tool_calls: None,
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Content as a string slice, empty when absent.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Content length in Unicode scalar values.
    pub fn content_chars(&self) -> usize {
        self.content_str().chars().count()
    }

    /// True when the message carries a non-empty `tool_calls` list.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Parse the `_cce_original` provenance entry, if any.
    pub fn provenance(&self) -> Option<Provenance> {
        self.metadata
            .get(PROVENANCE_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Attach (or replace) the `_cce_original` provenance entry.
    pub fn set_provenance(&mut self, prov: &Provenance) {
        let value = serde_json::to_value(prov).expect("provenance is plain data");
        self.metadata.insert(PROVENANCE_KEY.to_string(), value);
    }
}

/// Provenance attached to every message the compressor rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Ordered, non-empty list of original message ids covered by this
    /// rewrite. Length > 1 when consecutive messages were merged.
    pub ids: Vec<String>,
    /// Deterministic id of shape `cce_sum_<base36 digest>`.
    pub summary_id: String,
    /// Summary ids of rewrites found inside the input to this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<String>>,
    /// Mirrors the caller-supplied `source_version`.
    #[serde(default)]
    pub version: i64,
}

/// Id-keyed side-store of original messages. Persist together with the
/// compressed sequence; decompression consults it to restore originals.
pub type VerbatimMap = BTreeMap<String, Message>;
