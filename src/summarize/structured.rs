//! Structured-output summarization.
//!
//! Build logs, test reports, and diagnostic dumps are line-shaped, not
//! sentence-shaped; scoring them as prose keeps the wrong lines. When most
//! lines look structural the summarizer switches to extracting the top
//! lines whole: status lines and `path:line` references first, then
//! `KEY=value` pairs and bullets.

use std::sync::LazyLock;

use regex::Regex;

use super::STATUS_WORD;

/// Minimum non-empty lines before the structured path is considered.
const MIN_LINES: usize = 6;
/// Average line length below which the input counts as line-dense.
const MAX_AVG_LINE_CHARS: f64 = 80.0;
/// Share of structural lines required.
const MIN_STRUCTURAL_SHARE: f64 = 0.5;

static PATH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w./-]+:\d+(?::\d+)?").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*+•]\s+").unwrap());
static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_]*=\S").unwrap());

/// True for log-shaped input: enough lines, dense newlines, and mostly
/// structural lines.
pub(crate) fn is_structured(text: &str) -> bool {
    let non_empty: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.len() < MIN_LINES {
        return false;
    }
    let chars = text.chars().count();
    let line_count = text.lines().count();
    if line_count == 0 || chars as f64 / line_count as f64 >= MAX_AVG_LINE_CHARS {
        return false;
    }
    let structural = non_empty.iter().filter(|l| line_score(l) > 0).count();
    structural as f64 / non_empty.len() as f64 > MIN_STRUCTURAL_SHARE
}

/// Structural weight of a line. Zero means not structural.
fn line_score(line: &str) -> i64 {
    let mut score = 0i64;
    if STATUS_WORD.is_match(line) {
        score += 3;
    }
    if PATH_LINE.is_match(line) {
        score += 2;
    }
    if KEY_VALUE.is_match(line) {
        score += 1;
    }
    if BULLET.is_match(line) {
        score += 1;
    }
    score
}

/// Extract the top structural lines into the budget, original order.
pub(crate) fn summarize_structured(text: &str, budget: usize) -> String {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .map(|l| l.trim_end())
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();
    let mut scored: Vec<(i64, usize, &str)> = lines
        .iter()
        .filter_map(|&(pos, line)| {
            let score = line_score(line);
            (score > 0).then_some((score, pos, line))
        })
        .collect();
    scored.sort_by_key(|&(score, pos, _)| (-score, pos));

    let mut selected: Vec<(usize, &str)> = Vec::new();
    for &(_, pos, line) in &scored {
        let mut attempt = selected.clone();
        attempt.push((pos, line));
        attempt.sort_by_key(|&(p, _)| p);
        let assembled_len: usize = attempt
            .iter()
            .map(|(_, l)| l.chars().count())
            .sum::<usize>()
            + attempt.len().saturating_sub(1);
        if assembled_len <= budget {
            selected = attempt;
        }
    }

    if selected.is_empty() {
        let first = scored
            .first()
            .map(|&(_, _, l)| l)
            .unwrap_or_else(|| text.trim());
        return first.chars().take(budget).collect();
    }
    selected
        .iter()
        .map(|(_, l)| *l)
        .collect::<Vec<_>>()
        .join("\n")
}
