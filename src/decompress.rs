//! Restoring originals from the verbatim store.
//!
//! A linear pass over the compressed sequence: messages without provenance
//! pass through; rewrites resolve their covered ids against the store. A
//! fully resolved multi-id rewrite expands into that many originals; a
//! rewrite whose ids were all restored earlier in the same pass (the
//! empty remnants of a merge) drops out, which is what keeps the restored
//! sequence byte-identical to the pre-compression input. Missing store
//! entries degrade gracefully: the compressed form stays and the id lands
//! in `missing_ids`.

use std::collections::HashSet;

use tracing::debug;

use crate::error::CceError;
use crate::message::{Message, VerbatimMap};
use crate::pipeline::validate;

/// Cap on recursive restore rounds.
const MAX_DEPTH: usize = 10;

/// The verbatim side-store: a map, or a lookup function for callers that
/// shard or lazily load their stores.
pub enum VerbatimStore<'a> {
    Map(&'a VerbatimMap),
    Lookup(&'a (dyn Fn(&str) -> Option<Message> + 'a)),
}

impl VerbatimStore<'_> {
    fn lookup(&self, id: &str) -> Option<Message> {
        match self {
            VerbatimStore::Map(map) => map.get(id).cloned(),
            VerbatimStore::Lookup(f) => f(id),
        }
    }
}

/// Options for [`uncompress`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UncompressOptions {
    /// Keep restoring while restored messages themselves carry provenance,
    /// up to 10 rounds. Needed after repeated compressions.
    pub recursive: bool,
}

/// Output of [`uncompress`].
#[derive(Debug, Clone)]
pub struct UncompressResult {
    pub messages: Vec<Message>,
    /// Rewrites whose provenance was consumed (all passes).
    pub messages_expanded: usize,
    /// Messages that passed through unchanged in the final pass.
    pub messages_passthrough: usize,
    /// Ids referenced by provenance but absent from the store.
    pub missing_ids: Vec<String>,
}

/// Restore a compressed sequence from its verbatim store.
pub fn uncompress(
    messages: &[Message],
    store: &VerbatimStore,
    options: &UncompressOptions,
) -> Result<UncompressResult, CceError> {
    validate(messages)?;

    let mut current = messages.to_vec();
    let mut expanded_total = 0usize;
    let mut passthrough = 0usize;
    let mut missing: Vec<String> = Vec::new();

    for depth in 0..MAX_DEPTH {
        let pass = single_pass(&current, store);
        expanded_total += pass.expanded;
        passthrough = pass.passthrough;
        for id in pass.missing {
            if !missing.contains(&id) {
                missing.push(id);
            }
        }
        let done = pass.expanded == 0;
        current = pass.messages;
        if !options.recursive || done {
            break;
        }
        debug!(depth, "recursive restore continues");
    }

    Ok(UncompressResult {
        messages: current,
        messages_expanded: expanded_total,
        messages_passthrough: passthrough,
        missing_ids: missing,
    })
}

struct Pass {
    messages: Vec<Message>,
    expanded: usize,
    passthrough: usize,
    missing: Vec<String>,
}

fn single_pass(messages: &[Message], store: &VerbatimStore) -> Pass {
    let mut out = Vec::with_capacity(messages.len());
    let mut expanded = 0usize;
    let mut passthrough = 0usize;
    let mut missing: Vec<String> = Vec::new();
    let mut restored: HashSet<String> = HashSet::new();

    for msg in messages {
        let Some(prov) = msg.provenance() else {
            out.push(msg.clone());
            passthrough += 1;
            continue;
        };

        let mut resolved: Vec<Message> = Vec::with_capacity(prov.ids.len());
        let mut any_missing = false;
        for id in &prov.ids {
            match store.lookup(id) {
                Some(original) => resolved.push(original),
                None => {
                    any_missing = true;
                    if !missing.contains(id) {
                        missing.push(id.clone());
                    }
                }
            }
        }
        if any_missing {
            // Degrade: the compressed form stays in the output.
            out.push(msg.clone());
            passthrough += 1;
            continue;
        }

        expanded += 1;
        for original in resolved {
            if restored.insert(original.id.clone()) {
                out.push(original);
            }
        }
    }

    Pass {
        messages: out,
        expanded,
        passthrough,
        missing,
    }
}
