//! Token budget search over the recency window, with force-converge.
//!
//! The recency window is the knob: a larger window protects more recent
//! messages but compresses less. The search binary-searches the largest
//! window whose pipeline output still fits the budget, which costs at most
//! `ceil(log2(N))` pipeline passes plus one final pass. When even the floor
//! window cannot fit and the caller opted in, force-converge hard-truncates
//! the longest emitted messages, one at a time, until the budget holds.

use tracing::debug;

use crate::classify;
use crate::hash;
use crate::llm::Summarizer;
use crate::message::{Message, Provenance};
use crate::pipeline::{
    run_pipeline, run_pipeline_async, BudgetInfo, CompressOptions, CompressResult, Emitted,
};

/// Characters kept by a force-converge truncation.
const TRUNCATE_KEEP_CHARS: usize = 512;

/// Default heuristic: `ceil(content_chars / 3.5)`.
pub fn default_token_counter(message: &Message) -> usize {
    (message.content_chars() as f64 / 3.5).ceil() as usize
}

pub(crate) fn count_message(message: &Message, opts: &CompressOptions) -> usize {
    match &opts.token_counter {
        Some(counter) => counter(message),
        None => default_token_counter(message),
    }
}

pub(crate) fn count_all(messages: &[Message], opts: &CompressOptions) -> usize {
    messages.iter().map(|m| count_message(m, opts)).sum()
}

/// Untouched pass-through for inputs already within budget.
fn passthrough(messages: &[Message]) -> Emitted {
    Emitted {
        messages: messages.to_vec(),
        preserved: messages.len(),
        ..Emitted::default()
    }
}

pub(crate) fn search(
    messages: &[Message],
    opts: &CompressOptions,
    token_budget: usize,
) -> CompressResult {
    let total = count_all(messages, opts);
    if total <= token_budget {
        return passthrough(messages).into_result(
            messages,
            opts,
            Some(BudgetInfo {
                fits: true,
                token_count: total,
                recency_window: messages.len(),
            }),
        );
    }

    let mut lo = opts.min_recency_window;
    let mut hi = messages.len().saturating_sub(1).max(lo);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let probe = run_pipeline(messages, opts, mid);
        let tokens = count_all(&probe.messages, opts);
        debug!(window = mid, tokens, token_budget, "budget probe");
        if tokens <= token_budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let emitted = run_pipeline(messages, opts, lo);
    finish(emitted, messages, opts, token_budget, lo)
}

pub(crate) async fn search_async(
    messages: &[Message],
    opts: &CompressOptions,
    token_budget: usize,
    summarizer: &dyn Summarizer,
) -> CompressResult {
    let total = count_all(messages, opts);
    if total <= token_budget {
        return passthrough(messages).into_result(
            messages,
            opts,
            Some(BudgetInfo {
                fits: true,
                token_count: total,
                recency_window: messages.len(),
            }),
        );
    }

    let mut lo = opts.min_recency_window;
    let mut hi = messages.len().saturating_sub(1).max(lo);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let probe = run_pipeline_async(messages, opts, mid, summarizer).await;
        let tokens = count_all(&probe.messages, opts);
        debug!(window = mid, tokens, token_budget, "budget probe");
        if tokens <= token_budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let emitted = run_pipeline_async(messages, opts, lo, summarizer).await;
    finish(emitted, messages, opts, token_budget, lo)
}

fn finish(
    mut emitted: Emitted,
    messages: &[Message],
    opts: &CompressOptions,
    token_budget: usize,
    window: usize,
) -> CompressResult {
    let mut tokens = count_all(&emitted.messages, opts);
    let mut fits = tokens <= token_budget;
    if !fits && opts.force_converge {
        tokens = force_converge(&mut emitted, messages, opts, window, token_budget);
        fits = tokens <= token_budget;
    }
    emitted.into_result(
        messages,
        opts,
        Some(BudgetInfo {
            fits,
            token_count: tokens,
            recency_window: window,
        }),
    )
}

/// Hard-truncate emitted messages, longest first, until the budget holds.
///
/// Operates on the emitted post-guard sequence: merge decisions are never
/// revisited. Already-compressed messages only swap content; untouched
/// ones gain provenance and a verbatim entry so the round trip survives.
fn force_converge(
    emitted: &mut Emitted,
    originals: &[Message],
    opts: &CompressOptions,
    window: usize,
    token_budget: usize,
) -> usize {
    let total = emitted.messages.len();
    let mut tokens = count_all(&emitted.messages, opts);

    let mut candidates: Vec<usize> = (0..total)
        .filter(|&i| {
            let msg = &emitted.messages[i];
            !classify::in_recency_window(i, total, window)
                && !role_preserved(msg, opts)
                && msg.content_chars() > TRUNCATE_KEEP_CHARS
        })
        .collect();
    candidates.sort_by_key(|&i| (std::cmp::Reverse(emitted.messages[i].content_chars()), i));

    for i in candidates {
        if tokens <= token_budget {
            break;
        }
        let orig_len = emitted.messages[i].content_chars();
        let marker = {
            let head: String = emitted.messages[i]
                .content_str()
                .chars()
                .take(TRUNCATE_KEEP_CHARS)
                .collect();
            format!("[truncated — {orig_len} chars: {head}]")
        };
        // Truncation must still shrink the message; contents barely over
        // the keep length cannot absorb the marker overhead.
        if marker.chars().count() >= orig_len {
            continue;
        }
        if emitted.messages[i].provenance().is_none() {
            let ids = vec![emitted.messages[i].id.clone()];
            emitted.messages[i].set_provenance(&Provenance {
                ids: ids.clone(),
                summary_id: hash::summary_id(&ids),
                parent_ids: None,
                version: opts.source_version,
            });
            emitted
                .verbatim
                .insert(originals[i].id.clone(), originals[i].clone());
            emitted.compressed += 1;
            emitted.preserved = emitted.preserved.saturating_sub(1);
        }
        emitted.messages[i].content = Some(marker);
        tokens = count_all(&emitted.messages, opts);
        debug!(id = %emitted.messages[i].id, tokens, "force-converge truncation");
    }
    tokens
}

fn role_preserved(msg: &Message, opts: &CompressOptions) -> bool {
    msg.role
        .as_deref()
        .is_some_and(|role| opts.preserve.iter().any(|r| r == role))
}
