//! Message classification: tiers and preservation reasons.
//!
//! Every message gets a tier (preserve, short prose, long prose) and a set
//! of reasons. Hard reasons force preservation; soft signals are recorded
//! for the entity extractor but allow compression. Rules run in a fixed
//! order and the first decisive one wins.

pub(crate) mod detectors;
pub(crate) mod signals;

pub(crate) use signals::SoftSignal;

use crate::message::Message;
use crate::split;

/// Compression tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tier {
    /// Pass through verbatim.
    Preserve,
    /// Compressible prose under 20 words.
    ShortProse,
    /// Compressible prose of 20 words or more.
    LongProse,
}

/// Why a message is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreserveReason {
    PreservedRole,
    RecencyWindow,
    ToolCalls,
    ShortContent,
    AlreadyCompressed,
    FencedCode,
    IndentedCode,
    JsonShaped,
    YamlShaped,
    SpecialCharDensity,
    IrregularLineLengths,
    ApiKey,
    LatexMath,
    MathSymbols,
    SqlContent,
    Verse,
    ParsesAsJson,
}

/// Per-message classification outcome.
#[derive(Debug, Clone)]
pub(crate) struct Verdict {
    pub tier: Tier,
    /// Fenced code with enough surrounding prose: split instead of
    /// preserving or summarizing whole.
    pub code_split: bool,
    pub hard: Vec<PreserveReason>,
    pub soft: Vec<SoftSignal>,
}

impl Verdict {
    pub(crate) fn preserved(&self) -> bool {
        matches!(self.tier, Tier::Preserve)
    }

    fn preserve(reason: PreserveReason) -> Self {
        Self {
            tier: Tier::Preserve,
            code_split: false,
            hard: vec![reason],
            soft: Vec::new(),
        }
    }
}

/// Content prefixes that mark an earlier compression round.
const COMPRESSED_PREFIXES: &[&str] = &["[summary:", "[summary#", "[truncated"];

/// Minimum content length worth compressing.
const MIN_COMPRESSIBLE_CHARS: usize = 120;

/// Minimum surrounding prose for the code-split path.
const MIN_SPLIT_PROSE_CHARS: usize = 80;

/// Special-character density above which content is preserved.
const SPECIAL_CHAR_THRESHOLD: f64 = 0.15;

/// Line-length coefficient of variation above which content is preserved.
const LINE_VARIATION_THRESHOLD: f64 = 1.2;

/// Word-count boundary between short and long prose.
const SHORT_PROSE_WORDS: usize = 20;

pub(crate) struct ClassifyContext<'a> {
    /// Roles never compressed.
    pub preserve: &'a [String],
    /// Count of tail messages exempted from compression.
    pub recency_window: usize,
}

/// True when `position` falls inside the protected tail of `total` messages.
pub(crate) fn in_recency_window(position: usize, total: usize, window: usize) -> bool {
    position + window >= total
}

/// True for content produced by an earlier compression round.
pub(crate) fn is_already_compressed(content: &str) -> bool {
    COMPRESSED_PREFIXES.iter().any(|p| content.starts_with(p))
}

/// Classify one message. `position` is its place in the sequence of
/// `total` messages; the message's own `index` field is not consulted.
pub(crate) fn classify(
    msg: &Message,
    position: usize,
    total: usize,
    ctx: &ClassifyContext,
) -> Verdict {
    if let Some(role) = msg.role.as_deref() {
        if ctx.preserve.iter().any(|r| r == role) {
            return Verdict::preserve(PreserveReason::PreservedRole);
        }
    }
    if in_recency_window(position, total, ctx.recency_window) {
        return Verdict::preserve(PreserveReason::RecencyWindow);
    }
    if msg.has_tool_calls() {
        return Verdict::preserve(PreserveReason::ToolCalls);
    }

    let content = msg.content_str();
    if content.chars().count() < MIN_COMPRESSIBLE_CHARS {
        return Verdict::preserve(PreserveReason::ShortContent);
    }
    if is_already_compressed(content) {
        return Verdict::preserve(PreserveReason::AlreadyCompressed);
    }

    let word_count = content.split_whitespace().count();
    let tier = if word_count < SHORT_PROSE_WORDS {
        Tier::ShortProse
    } else {
        Tier::LongProse
    };

    // Fenced code decides between code-split and whole-message preservation
    // before the remaining structural detectors run; code inside fences
    // would otherwise trip the density checks and hide the split path.
    if detectors::has_fenced_code(content) {
        if split::prose_char_len(content) >= MIN_SPLIT_PROSE_CHARS {
            return Verdict {
                tier,
                code_split: true,
                hard: Vec::new(),
                soft: signals::detect_signals(content),
            };
        }
        return Verdict::preserve(PreserveReason::FencedCode);
    }

    let hard = hard_reasons(content);
    if !hard.is_empty() {
        return Verdict {
            tier: Tier::Preserve,
            code_split: false,
            hard,
            soft: Vec::new(),
        };
    }
    if serde_json::from_str::<serde_json::Value>(content).is_ok() {
        return Verdict::preserve(PreserveReason::ParsesAsJson);
    }

    Verdict {
        tier,
        code_split: false,
        hard: Vec::new(),
        soft: signals::detect_signals(content),
    }
}

fn hard_reasons(content: &str) -> Vec<PreserveReason> {
    let mut hard = Vec::new();
    if detectors::has_indented_code(content) {
        hard.push(PreserveReason::IndentedCode);
    }
    if detectors::is_json_shaped(content) {
        hard.push(PreserveReason::JsonShaped);
    }
    if detectors::is_yaml_shaped(content) {
        hard.push(PreserveReason::YamlShaped);
    }
    if detectors::special_char_ratio(content) > SPECIAL_CHAR_THRESHOLD {
        hard.push(PreserveReason::SpecialCharDensity);
    }
    if detectors::line_length_variation(content) > LINE_VARIATION_THRESHOLD {
        hard.push(PreserveReason::IrregularLineLengths);
    }
    if detectors::has_api_key(content) {
        hard.push(PreserveReason::ApiKey);
    }
    if detectors::has_latex_math(content) {
        hard.push(PreserveReason::LatexMath);
    }
    if detectors::has_unicode_math(content) {
        hard.push(PreserveReason::MathSymbols);
    }
    if detectors::is_sql(content) {
        hard.push(PreserveReason::SqlContent);
    }
    if detectors::is_verse(content) {
        hard.push(PreserveReason::Verse);
    }
    hard
}
