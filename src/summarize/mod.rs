//! Deterministic prose summarization.
//!
//! No LLM involved: sentences are scored by additive integer heuristics
//! (identifiers, units, status words, importance cues, filler penalties),
//! packed greedily into a character budget with paragraph-primary priority,
//! and re-emitted in original order. Entity extraction fishes identifiers
//! and measurements back out of the original text so the summary keeps its
//! anchors even when the carrying sentences were dropped.

pub(crate) mod sentences;
pub(crate) mod structured;

use std::collections::HashSet;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::classify::detectors::word_bounded_pattern_ids;
use sentences::{split_into_sentences, Sentence};

/// Budget for inputs under 600 chars.
const SMALL_BUDGET: usize = 200;
/// Budget for everything else.
const LARGE_BUDGET: usize = 400;
/// Input size at which the budget steps up.
const SMALL_INPUT_CHARS: usize = 600;
/// Maximum extracted entities.
const MAX_ENTITIES: usize = 10;

/// Character budget for a summary of an input of `chars` length.
pub(crate) fn budget_for(chars: usize) -> usize {
    if chars < SMALL_INPUT_CHARS {
        SMALL_BUDGET
    } else {
        LARGE_BUDGET
    }
}

/// A deterministic summary: packed sentence text plus extracted entities.
#[derive(Debug, Clone)]
pub(crate) struct Summary {
    pub text: String,
    pub entities: Vec<String>,
}

/// Summarize prose (or structured output) into the budget for its length.
pub(crate) fn summarize(text: &str) -> Summary {
    let budget = budget_for(text.chars().count());
    let body = if structured::is_structured(text) {
        structured::summarize_structured(text, budget)
    } else {
        pack_sentences(text, budget)
    };
    Summary {
        text: body,
        entities: extract_entities(text, MAX_ENTITIES),
    }
}

static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z][a-z0-9]*(?:[A-Z][A-Za-z0-9]*)+\b").unwrap());
static PASCAL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[A-Z][a-z0-9]+){2,}\b").unwrap());
static SNAKE_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b").unwrap());
static UNIT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:\.\d+)?\s*(?:ms|sec|secs|min|mins|hr|hrs|h|s|KB|MB|GB|TB|kb|mb|gb|tb)\b")
        .unwrap()
});
static PERCENT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?%").unwrap());
static VOWELLESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[b-df-hj-np-tv-z]{3,}\b").unwrap());
pub(super) static STATUS_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:PASS|FAIL|ERROR|WARNING|WARN)\b").unwrap());
static GREP_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[\w./-]+:\d+:").unwrap());

static IMPORTANCE_CUES: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "importantly",
            "however",
            "critically",
            "critical",
            "must",
            "should",
            "warning",
            "note that",
            "key",
            "crucial",
        ])
        .unwrap()
});

/// Openers that mark a sentence as conversational filler.
const FILLER_OPENERS: &[&str] = &[
    "happy to help",
    "thank you",
    "of course",
    "thanks",
    "great",
    "sure",
    "okay",
    "ok",
    "certainly",
    "absolutely",
];

/// Additive heuristic score of one sentence.
pub(crate) fn score_sentence(sentence: &str) -> i64 {
    let mut score = 0i64;

    score += 3 * distinct_matches(&CAMEL_CASE, sentence) as i64;
    score += 3 * distinct_matches(&PASCAL_CASE, sentence) as i64;
    score += 3 * distinct_matches(&SNAKE_CASE, sentence) as i64;
    if !word_bounded_pattern_ids(&IMPORTANCE_CUES, sentence).is_empty() {
        score += 4;
    }
    score += 2 * (UNIT_NUMBER.find_iter(sentence).count()
        + PERCENT_NUMBER.find_iter(sentence).count()) as i64;
    score += 2 * distinct_matches(&VOWELLESS, sentence) as i64;
    score += 3 * STATUS_WORD.find_iter(sentence).count() as i64;
    score += 2 * GREP_REF.find_iter(sentence).count() as i64;

    let len = sentence.chars().count();
    if (40..=120).contains(&len) {
        score += 2;
    }
    if has_filler_opener(sentence) {
        score -= 10;
    }
    score
}

fn distinct_matches(re: &Regex, text: &str) -> usize {
    re.find_iter(text)
        .map(|m| m.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn has_filler_opener(sentence: &str) -> bool {
    let lower = sentence.trim_start().to_lowercase();
    FILLER_OPENERS.iter().any(|opener| {
        lower.starts_with(opener)
            && !lower[opener.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric())
    })
}

/// Greedy budget pack: per-paragraph primaries first (best score, earliest
/// on ties), then secondaries, each admitted only when the assembled text
/// still fits. Selected sentences re-sort into original order; adjacent
/// picks join with a space, gaps with ` ... `.
fn pack_sentences(text: &str, budget: usize) -> String {
    let sentences = split_into_sentences(text);
    if sentences.is_empty() {
        return truncate_chars(text.trim(), budget);
    }

    let scores: Vec<i64> = sentences.iter().map(|s| score_sentence(&s.text)).collect();
    let primaries = paragraph_primaries(&sentences, &scores);

    let mut order: Vec<usize> = (0..sentences.len()).collect();
    order.sort_by_key(|&i| (!primaries.contains(&i), -scores[i], sentences[i].position));

    let mut selected: Vec<usize> = Vec::new();
    for i in order {
        let mut attempt = selected.clone();
        attempt.push(i);
        attempt.sort_by_key(|&j| sentences[j].position);
        if assemble(&sentences, &attempt).chars().count() <= budget {
            selected = attempt;
        }
    }

    if selected.is_empty() {
        let best = (0..sentences.len())
            .max_by_key(|&i| (scores[i], std::cmp::Reverse(sentences[i].position)))
            .expect("non-empty sentence list");
        return truncate_chars(&sentences[best].text, budget);
    }
    assemble(&sentences, &selected)
}

/// Index of the best-scored sentence in each paragraph.
fn paragraph_primaries(sentences: &[Sentence], scores: &[i64]) -> HashSet<usize> {
    let mut best: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
    for (i, s) in sentences.iter().enumerate() {
        match best.get(&s.paragraph) {
            Some(&cur) if scores[cur] >= scores[i] => {}
            _ => {
                best.insert(s.paragraph, i);
            }
        }
    }
    best.into_values().collect()
}

fn assemble(sentences: &[Sentence], selected: &[usize]) -> String {
    let mut out = String::new();
    let mut prev: Option<usize> = None;
    for &i in selected {
        if let Some(p) = prev {
            if sentences[i].position == sentences[p].position + 1 {
                out.push(' ');
            } else {
                out.push_str(" ... ");
            }
        }
        out.push_str(&sentences[i].text);
        prev = Some(i);
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Common sentence starters excluded from the proper-noun entity category.
const SENTENCE_STARTERS: &[&str] = &[
    "The", "This", "That", "These", "Those", "It", "Its", "A", "An", "In", "On", "At", "We",
    "I", "You", "He", "She", "They", "If", "For", "But", "And", "Or", "So", "As", "To", "Of",
    "With", "From", "By", "Is", "Are", "Was", "Were", "Be", "Not", "No", "Yes", "Then",
    "When", "While", "After", "Before", "Here", "There", "What", "Which", "Who", "How",
    "Why", "Also", "However", "Note", "Please", "Let", "Use", "Our", "Your", "My",
];

static PROPER_NOUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\b").unwrap());

/// Extract up to `max` entities from the original text, in preference
/// order: proper nouns, PascalCase, camelCase, snake_case, vowelless
/// abbreviations, numbers with units.
pub(crate) fn extract_entities(text: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let push = |candidate: &str, out: &mut Vec<String>, seen: &mut HashSet<String>| {
        if out.len() < max && seen.insert(candidate.to_string()) {
            out.push(candidate.to_string());
        }
    };

    for m in PROPER_NOUN.find_iter(text) {
        if !SENTENCE_STARTERS.contains(&m.as_str()) {
            push(m.as_str(), &mut out, &mut seen);
        }
    }
    for re in [&PASCAL_CASE, &CAMEL_CASE, &SNAKE_CASE, &VOWELLESS] {
        for m in re.find_iter(text) {
            push(m.as_str(), &mut out, &mut seen);
        }
    }
    for re in [&UNIT_NUMBER, &PERCENT_NUMBER] {
        for m in re.find_iter(text) {
            push(m.as_str(), &mut out, &mut seen);
        }
    }
    out
}
