//! Pipeline orchestration: classify, dedup, group, summarize, guard, stamp.
//!
//! The walk is strictly left-to-right. Consecutive compressible messages of
//! one role merge into a group and summarize together; preserved messages,
//! dedup rewrites, and code-split messages each close the current group.
//! Every rewrite passes the size guard (strictly shorter or abandoned) and
//! carries `_cce_original` provenance, with the covered originals copied
//! into the verbatim store. Merging never changes sequence length: the
//! first member carries the merged summary, later members emit as
//! empty-content remnants whose provenance the decompressor collapses.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::budget;
use crate::classify::{self, ClassifyContext, Verdict};
use crate::dedup::{self, DedupConfig, DedupOutcome, DupKind, DupRewrite};
use crate::error::CceError;
use crate::hash;
use crate::llm::Summarizer;
use crate::message::{Message, Provenance, VerbatimMap};
use crate::split;
use crate::summarize::{self, Summary};

/// Pluggable per-message token counter.
pub type TokenCounter = Arc<dyn Fn(&Message) -> usize + Send + Sync>;

/// Compression options. Defaults match the common case: protect `system`
/// turns and the last 4 messages, exact dedup on, everything else off.
#[derive(Clone)]
pub struct CompressOptions {
    /// Roles never compressed.
    pub preserve: Vec<String>,
    /// Count of tail messages exempted from compression.
    pub recency_window: usize,
    /// Tag copied into every emitted `_cce_original.version`.
    pub source_version: i64,
    /// Target token count; enables the budget search.
    pub token_budget: Option<usize>,
    /// Floor for the budget search.
    pub min_recency_window: usize,
    /// Exact dedup.
    pub dedup: bool,
    /// Fuzzy dedup.
    pub fuzzy_dedup: bool,
    /// Jaccard threshold for fuzzy dedup, in [0, 1].
    pub fuzzy_threshold: f64,
    /// Inline the summary id into emitted content (`[summary#<id>: …]`).
    pub embed_summary_id: bool,
    /// Hard-truncate the tail when the budget search cannot fit.
    pub force_converge: bool,
    /// Replaces the default `ceil(chars / 3.5)` counter.
    pub token_counter: Option<TokenCounter>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            preserve: vec!["system".to_string()],
            recency_window: 4,
            source_version: 0,
            token_budget: None,
            min_recency_window: 0,
            dedup: true,
            fuzzy_dedup: false,
            fuzzy_threshold: 0.85,
            embed_summary_id: false,
            force_converge: false,
            token_counter: None,
        }
    }
}

impl fmt::Debug for CompressOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressOptions")
            .field("preserve", &self.preserve)
            .field("recency_window", &self.recency_window)
            .field("source_version", &self.source_version)
            .field("token_budget", &self.token_budget)
            .field("min_recency_window", &self.min_recency_window)
            .field("dedup", &self.dedup)
            .field("fuzzy_dedup", &self.fuzzy_dedup)
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field("embed_summary_id", &self.embed_summary_id)
            .field("force_converge", &self.force_converge)
            .field(
                "token_counter",
                &self.token_counter.as_ref().map(|_| "<custom>"),
            )
            .finish()
    }
}

/// Aggregate statistics for one compression.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionStats {
    /// `sum_orig_chars / sum_result_chars`.
    pub ratio: f64,
    /// Same ratio measured with the token counter.
    pub token_ratio: f64,
    pub messages_compressed: usize,
    pub messages_preserved: usize,
    /// Present when exact dedup ran.
    pub messages_deduped: Option<usize>,
    /// Present when fuzzy dedup ran.
    pub messages_fuzzy_deduped: Option<usize>,
    /// Mirrors `source_version`.
    pub original_version: i64,
}

/// Output of [`compress`] / [`compress_with_summarizer`].
#[derive(Debug, Clone)]
pub struct CompressResult {
    /// Replacement sequence; same length and ids as the input.
    pub messages: Vec<Message>,
    /// Originals for every id referenced by emitted provenance. Persist
    /// together with `messages`.
    pub verbatim: VerbatimMap,
    pub compression: CompressionStats,
    /// Whether the budget was met (budget search only).
    pub fits: Option<bool>,
    /// Final token count (budget search only).
    pub token_count: Option<usize>,
    /// Recency window the final pass ran with (budget search only).
    pub recency_window: Option<usize>,
}

/// Budget-search report attached to the result.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BudgetInfo {
    pub fits: bool,
    pub token_count: usize,
    pub recency_window: usize,
}

/// One pipeline pass before stats assembly.
#[derive(Debug, Default)]
pub(crate) struct Emitted {
    pub messages: Vec<Message>,
    pub verbatim: VerbatimMap,
    pub compressed: usize,
    pub preserved: usize,
    pub deduped: usize,
    pub fuzzy_deduped: usize,
}

impl Emitted {
    pub(crate) fn into_result(
        self,
        originals: &[Message],
        opts: &CompressOptions,
        budget_info: Option<BudgetInfo>,
    ) -> CompressResult {
        let orig_chars: usize = originals.iter().map(Message::content_chars).sum();
        let result_chars: usize = self.messages.iter().map(Message::content_chars).sum();
        let orig_tokens = budget::count_all(originals, opts);
        let result_tokens = budget::count_all(&self.messages, opts);
        let compression = CompressionStats {
            ratio: ratio_of(orig_chars, result_chars),
            token_ratio: ratio_of(orig_tokens, result_tokens),
            messages_compressed: self.compressed,
            messages_preserved: self.preserved,
            messages_deduped: opts.dedup.then_some(self.deduped),
            messages_fuzzy_deduped: opts.fuzzy_dedup.then_some(self.fuzzy_deduped),
            original_version: opts.source_version,
        };
        CompressResult {
            messages: self.messages,
            verbatim: self.verbatim,
            compression,
            fits: budget_info.map(|b| b.fits),
            token_count: budget_info.map(|b| b.token_count),
            recency_window: budget_info.map(|b| b.recency_window),
        }
    }
}

fn ratio_of(original: usize, result: usize) -> f64 {
    if result == 0 {
        1.0
    } else {
        original as f64 / result as f64
    }
}

/// Compress a message sequence. Synchronous; the deterministic summarizer
/// handles every group.
pub fn compress(
    messages: &[Message],
    options: &CompressOptions,
) -> Result<CompressResult, CceError> {
    validate(messages)?;
    match options.token_budget {
        Some(token_budget) => Ok(budget::search(messages, options, token_budget)),
        None => {
            let emitted = run_pipeline(messages, options, options.recency_window);
            Ok(emitted.into_result(messages, options, None))
        }
    }
}

/// Compress with an external summarizer, awaiting each group call in
/// message order. Failures and oversized outputs fall back to the
/// deterministic summarizer; the size guard applies either way.
pub async fn compress_with_summarizer(
    messages: &[Message],
    options: &CompressOptions,
    summarizer: &dyn Summarizer,
) -> Result<CompressResult, CceError> {
    validate(messages)?;
    match options.token_budget {
        Some(token_budget) => {
            Ok(budget::search_async(messages, options, token_budget, summarizer).await)
        }
        None => {
            let emitted =
                run_pipeline_async(messages, options, options.recency_window, summarizer).await;
            Ok(emitted.into_result(messages, options, None))
        }
    }
}

pub(crate) fn validate(messages: &[Message]) -> Result<(), CceError> {
    for (position, msg) in messages.iter().enumerate() {
        if msg.id.is_empty() {
            return Err(CceError::MissingId { position });
        }
    }
    Ok(())
}

/// Processing plan for one message.
#[derive(Debug)]
enum Unit {
    Preserve(usize),
    Dedup(usize),
    CodeSplit(usize),
    Run(Vec<usize>),
}

struct Prepared {
    dedup: DedupOutcome,
    units: Vec<Unit>,
}

/// Classification, dedup, and grouping: everything before summarization.
fn prepare(messages: &[Message], opts: &CompressOptions, recency_window: usize) -> Prepared {
    let ctx = ClassifyContext {
        preserve: &opts.preserve,
        recency_window,
    };
    let verdicts: Vec<Verdict> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| classify::classify(m, i, messages.len(), &ctx))
        .collect();
    for (msg, verdict) in messages.iter().zip(&verdicts) {
        if verdict.preserved() {
            trace!(id = %msg.id, reasons = ?verdict.hard, "message preserved");
        } else if !verdict.soft.is_empty() {
            trace!(id = %msg.id, signals = ?verdict.soft, "informational markers noted");
        }
    }

    let dedup_outcome = if opts.dedup || opts.fuzzy_dedup {
        dedup::deduplicate(
            messages,
            &DedupConfig {
                preserve: &opts.preserve,
                recency_window,
                exact: opts.dedup,
                fuzzy: opts.fuzzy_dedup,
                fuzzy_threshold: opts.fuzzy_threshold,
            },
        )
    } else {
        DedupOutcome::default()
    };

    let units = plan_units(messages, &verdicts, &dedup_outcome);
    Prepared {
        dedup: dedup_outcome,
        units,
    }
}

/// Walk the sequence, closing the current same-role group whenever a
/// message is preserved, dedup-rewritten, code-split, or changes role.
fn plan_units(messages: &[Message], verdicts: &[Verdict], dedup: &DedupOutcome) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut run: Vec<usize> = Vec::new();
    for i in 0..messages.len() {
        let single = if dedup.rewrites.contains_key(&i) {
            Some(Unit::Dedup(i))
        } else if dedup.keep_targets.contains(&i) || verdicts[i].preserved() {
            Some(Unit::Preserve(i))
        } else if verdicts[i].code_split {
            Some(Unit::CodeSplit(i))
        } else {
            None
        };
        match single {
            Some(unit) => {
                if !run.is_empty() {
                    units.push(Unit::Run(std::mem::take(&mut run)));
                }
                units.push(unit);
            }
            None => {
                if let Some(&last) = run.last() {
                    if messages[last].role != messages[i].role {
                        units.push(Unit::Run(std::mem::take(&mut run)));
                    }
                }
                run.push(i);
            }
        }
    }
    if !run.is_empty() {
        units.push(Unit::Run(run));
    }
    units
}

pub(crate) fn run_pipeline(
    messages: &[Message],
    opts: &CompressOptions,
    recency_window: usize,
) -> Emitted {
    let prepared = prepare(messages, opts, recency_window);
    let mut out = Emitted::default();
    for unit in &prepared.units {
        match unit {
            Unit::Preserve(i) => emit_preserved(&mut out, &messages[*i]),
            Unit::Dedup(i) => {
                let rewrite = prepared.dedup.rewrites.get(i).expect("planned rewrite");
                emit_dedup(&mut out, messages, *i, rewrite, opts);
            }
            Unit::CodeSplit(i) => emit_code_split(&mut out, messages, *i, opts),
            Unit::Run(indices) => {
                let concat = concat_contents(messages, indices);
                let summary = summarize::summarize(&concat);
                emit_run(&mut out, messages, indices, summary, opts);
            }
        }
    }
    debug!(
        input = messages.len(),
        compressed = out.compressed,
        preserved = out.preserved,
        recency_window,
        "pipeline pass complete"
    );
    out
}

pub(crate) async fn run_pipeline_async(
    messages: &[Message],
    opts: &CompressOptions,
    recency_window: usize,
    summarizer: &dyn Summarizer,
) -> Emitted {
    let prepared = prepare(messages, opts, recency_window);
    let mut out = Emitted::default();
    for unit in &prepared.units {
        match unit {
            Unit::Preserve(i) => emit_preserved(&mut out, &messages[*i]),
            Unit::Dedup(i) => {
                let rewrite = prepared.dedup.rewrites.get(i).expect("planned rewrite");
                emit_dedup(&mut out, messages, *i, rewrite, opts);
            }
            // Code-split prose stays deterministic: the fences carry the
            // payload and the prose budget is small.
            Unit::CodeSplit(i) => emit_code_split(&mut out, messages, *i, opts),
            Unit::Run(indices) => {
                let concat = concat_contents(messages, indices);
                let summary = with_fallback(summarizer, &concat).await;
                emit_run(&mut out, messages, indices, summary, opts);
            }
        }
    }
    out
}

/// Accept the external result only when non-empty and strictly shorter
/// than the input; anything else falls back to the deterministic path.
async fn with_fallback(summarizer: &dyn Summarizer, input: &str) -> Summary {
    match summarizer.summarize(input).await {
        Ok(output)
            if !output.trim().is_empty()
                && output.chars().count() < input.chars().count() =>
        {
            Summary {
                text: output,
                entities: Vec::new(),
            }
        }
        Ok(_) => {
            warn!("external summarizer output rejected; using deterministic summarizer");
            summarize::summarize(input)
        }
        Err(error) => {
            warn!(%error, "external summarizer failed; using deterministic summarizer");
            summarize::summarize(input)
        }
    }
}

fn concat_contents(messages: &[Message], indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| messages[i].content_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn emit_preserved(out: &mut Emitted, msg: &Message) {
    out.messages.push(msg.clone());
    out.preserved += 1;
}

fn emit_dedup(
    out: &mut Emitted,
    messages: &[Message],
    i: usize,
    rewrite: &DupRewrite,
    opts: &CompressOptions,
) {
    let original = &messages[i];
    let ids = vec![original.id.clone()];
    let mut emitted = original.clone();
    emitted.content = Some(rewrite.marker.clone());
    emitted.set_provenance(&Provenance {
        ids: ids.clone(),
        summary_id: hash::summary_id(&ids),
        parent_ids: parent_ids_of(&[original]),
        version: opts.source_version,
    });
    out.verbatim.insert(original.id.clone(), original.clone());
    out.messages.push(emitted);
    match rewrite.kind {
        DupKind::Exact => out.deduped += 1,
        DupKind::Fuzzy => out.fuzzy_deduped += 1,
    }
}

fn emit_code_split(out: &mut Emitted, messages: &[Message], i: usize, opts: &CompressOptions) {
    let original = &messages[i];
    let (summary_text, fences) = split::code_split_parts(original.content_str());
    let ids = vec![original.id.clone()];
    let summary_id = hash::summary_id(&ids);
    let mut formatted = format_summary(opts, &summary_id, &summary_text, 1, &[]);
    for fence in &fences {
        formatted.push_str("\n\n");
        formatted.push_str(fence);
    }

    if formatted.chars().count() >= original.content_chars() {
        debug!(id = %original.id, "code-split result not smaller; preserving");
        emit_preserved(out, original);
        return;
    }

    let mut emitted = original.clone();
    emitted.content = Some(formatted);
    emitted.set_provenance(&Provenance {
        ids,
        summary_id,
        parent_ids: parent_ids_of(&[original]),
        version: opts.source_version,
    });
    out.verbatim.insert(original.id.clone(), original.clone());
    out.messages.push(emitted);
    out.compressed += 1;
}

/// Emit one summarized group, guarded: if the formatted rewrite is not
/// strictly shorter than the combined originals the merge is abandoned and
/// every member passes through unchanged.
fn emit_run(
    out: &mut Emitted,
    messages: &[Message],
    indices: &[usize],
    summary: Summary,
    opts: &CompressOptions,
) {
    let members: Vec<&Message> = indices.iter().map(|&i| &messages[i]).collect();
    let combined_chars: usize = members.iter().map(|m| m.content_chars()).sum();
    let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
    let summary_id = hash::summary_id(&ids);
    let formatted = format_summary(
        opts,
        &summary_id,
        &summary.text,
        members.len(),
        &summary.entities,
    );

    if formatted.chars().count() >= combined_chars {
        debug!(
            group = members.len(),
            "summary not smaller than source; passing group through"
        );
        for member in &members {
            emit_preserved(out, member);
        }
        return;
    }

    let mut head = members[0].clone();
    head.content = Some(formatted);
    head.set_provenance(&Provenance {
        ids,
        summary_id,
        parent_ids: parent_ids_of(&members),
        version: opts.source_version,
    });
    out.messages.push(head);

    for (k, &member) in members.iter().enumerate() {
        out.verbatim.insert(member.id.clone(), member.clone());
        if k == 0 {
            continue;
        }
        let remnant_ids = vec![member.id.clone()];
        let mut remnant = member.clone();
        remnant.content = Some(String::new());
        remnant.set_provenance(&Provenance {
            ids: remnant_ids.clone(),
            summary_id: hash::summary_id(&remnant_ids),
            parent_ids: parent_ids_of(&[member]),
            version: opts.source_version,
        });
        out.messages.push(remnant);
    }
    out.compressed += members.len();
}

/// Summary ids of rewrites already present inside this round's inputs.
fn parent_ids_of(inputs: &[&Message]) -> Option<Vec<String>> {
    let mut parents: Vec<String> = Vec::new();
    for msg in inputs {
        if let Some(prov) = msg.provenance() {
            if !parents.contains(&prov.summary_id) {
                parents.push(prov.summary_id);
            }
        }
    }
    (!parents.is_empty()).then_some(parents)
}

fn format_summary(
    opts: &CompressOptions,
    summary_id: &str,
    text: &str,
    merged_count: usize,
    entities: &[String],
) -> String {
    let mut body = if opts.embed_summary_id {
        format!("[summary#{summary_id}: {text}")
    } else {
        format!("[summary: {text}")
    };
    if merged_count > 1 {
        body.push_str(&format!(" ({merged_count} messages merged)"));
    }
    if !entities.is_empty() {
        body.push_str(&format!(" | entities: {}", entities.join(", ")));
    }
    body.push(']');
    body
}
