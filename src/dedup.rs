//! Exact and fuzzy cross-message duplicate detection.
//!
//! Runs before grouping. Each duplicate group elects a keep target (the
//! first occurrence inside the recency window, else the latest); the other
//! members are rewritten to short references. Exact matching hashes
//! length-prefixed content with djb2 and confirms by byte equality; fuzzy
//! matching fingerprints normalized lines, pairs candidates through an
//! inverted index, scores them with multiset line Jaccard, and groups
//! accepted pairs transitively with a disjoint-set union.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::classify::is_already_compressed;
use crate::hash::djb2;
use crate::message::Message;

/// Minimum content length eligible for dedup.
const MIN_DEDUP_CHARS: usize = 200;

/// Fingerprint size: the first N normalized lines.
const FINGERPRINT_LINES: usize = 5;

/// Fingerprint lines two messages must share to become a candidate pair.
const MIN_SHARED_FINGERPRINT: usize = 3;

/// Candidate pairs below this length ratio are skipped.
const MIN_LENGTH_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DupKind {
    Exact,
    Fuzzy,
}

/// A planned rewrite of one duplicate into a reference marker.
#[derive(Debug, Clone)]
pub(crate) struct DupRewrite {
    pub marker: String,
    pub kind: DupKind,
}

/// Dedup pass output, keyed by sequence position.
#[derive(Debug, Default)]
pub(crate) struct DedupOutcome {
    pub rewrites: BTreeMap<usize, DupRewrite>,
    /// Surviving originals of duplicate groups; the pipeline passes these
    /// through untouched so references stay meaningful in-context.
    pub keep_targets: BTreeSet<usize>,
}

impl DedupOutcome {
    #[cfg(test)]
    fn count(&self, kind: DupKind) -> usize {
        self.rewrites.values().filter(|r| r.kind == kind).count()
    }
}

pub(crate) struct DedupConfig<'a> {
    pub preserve: &'a [String],
    pub recency_window: usize,
    pub exact: bool,
    pub fuzzy: bool,
    pub fuzzy_threshold: f64,
}

pub(crate) fn deduplicate(messages: &[Message], cfg: &DedupConfig) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let eligible: Vec<usize> = (0..messages.len())
        .filter(|&i| is_eligible(&messages[i], cfg))
        .collect();
    if eligible.len() < 2 {
        return outcome;
    }

    let handled = if cfg.exact {
        exact_pass(messages, &eligible, cfg, &mut outcome)
    } else {
        HashSet::new()
    };
    if cfg.fuzzy {
        fuzzy_pass(messages, &eligible, &handled, cfg, &mut outcome);
    }
    outcome
}

fn is_eligible(msg: &Message, cfg: &DedupConfig) -> bool {
    if let Some(role) = msg.role.as_deref() {
        if cfg.preserve.iter().any(|r| r == role) {
            return false;
        }
    }
    if msg.has_tool_calls() {
        return false;
    }
    let content = msg.content_str();
    if content.chars().count() < MIN_DEDUP_CHARS {
        return false;
    }
    !(is_already_compressed(content) || content.starts_with("[cce:"))
}

fn in_window(position: usize, total: usize, window: usize) -> bool {
    position + window >= total
}

/// Group by djb2 of the length-prefixed content, then confirm by byte
/// equality within each hash bucket.
fn exact_pass(
    messages: &[Message],
    eligible: &[usize],
    cfg: &DedupConfig,
    outcome: &mut DedupOutcome,
) -> HashSet<usize> {
    let mut buckets: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for &i in eligible {
        let content = messages[i].content_str();
        let keyed = format!("{}:{}", content.chars().count(), content);
        buckets.entry(djb2(keyed.as_bytes())).or_default().push(i);
    }

    let mut handled = HashSet::new();
    for positions in buckets.into_values() {
        if positions.len() < 2 {
            continue;
        }
        // Byte-equality sub-groups, first occurrence as representative.
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for &i in &positions {
            match groups
                .iter_mut()
                .find(|g| messages[g[0]].content_str() == messages[i].content_str())
            {
                Some(group) => group.push(i),
                None => groups.push(vec![i]),
            }
        }
        for group in groups.into_iter().filter(|g| g.len() >= 2) {
            let keep = keep_target(&group, messages.len(), cfg.recency_window);
            handled.extend(group.iter().copied());
            outcome.keep_targets.insert(keep);
            for &i in &group {
                if i == keep || in_window(i, messages.len(), cfg.recency_window) {
                    continue;
                }
                let marker = format!(
                    "[cce:dup of {} — {} chars]",
                    messages[keep].id,
                    messages[i].content_chars()
                );
                outcome.rewrites.insert(
                    i,
                    DupRewrite {
                        marker,
                        kind: DupKind::Exact,
                    },
                );
            }
        }
    }
    handled
}

/// First occurrence inside the recency window, else the latest occurrence.
fn keep_target(group: &[usize], total: usize, window: usize) -> usize {
    group
        .iter()
        .copied()
        .find(|&i| in_window(i, total, window))
        .unwrap_or_else(|| *group.last().expect("dedup groups are non-empty"))
}

fn normalized_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

fn line_frequencies(lines: &[String]) -> HashMap<&str, usize> {
    let mut freq = HashMap::new();
    for line in lines {
        *freq.entry(line.as_str()).or_insert(0) += 1;
    }
    freq
}

/// Multiset Jaccard over normalized lines: per-line min over per-line max.
fn line_jaccard(a: &HashMap<&str, usize>, b: &HashMap<&str, usize>) -> f64 {
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (line, &ca) in a {
        let cb = b.get(line).copied().unwrap_or(0);
        intersection += ca.min(cb);
        union += ca.max(cb);
    }
    for (line, &cb) in b {
        if !a.contains_key(line) {
            union += cb;
        }
    }
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn fuzzy_pass(
    messages: &[Message],
    eligible: &[usize],
    handled: &HashSet<usize>,
    cfg: &DedupConfig,
    outcome: &mut DedupOutcome,
) {
    // Candidates: eligible, untouched by exact dedup, at least two lines.
    let candidates: Vec<usize> = eligible
        .iter()
        .copied()
        .filter(|i| !handled.contains(i))
        .collect();
    let lines: Vec<Vec<String>> = candidates
        .iter()
        .map(|&i| normalized_lines(messages[i].content_str()))
        .collect();
    let usable: Vec<usize> = (0..candidates.len())
        .filter(|&slot| lines[slot].len() >= 2)
        .collect();
    if usable.len() < 2 {
        return;
    }

    // Inverted index over fingerprint lines; shared-line counts per pair.
    let mut postings: HashMap<&str, BTreeSet<usize>> = HashMap::new();
    for &slot in &usable {
        for line in lines[slot].iter().take(FINGERPRINT_LINES) {
            postings.entry(line.as_str()).or_default().insert(slot);
        }
    }
    let mut shared: HashMap<(usize, usize), usize> = HashMap::new();
    for slots in postings.values() {
        let slots: Vec<usize> = slots.iter().copied().collect();
        for (ai, &a) in slots.iter().enumerate() {
            for &b in &slots[ai + 1..] {
                *shared.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    let freqs: Vec<HashMap<&str, usize>> =
        lines.iter().map(|l| line_frequencies(l)).collect();
    let mut dsu = DisjointSet::new(candidates.len());
    let mut pairs: Vec<(usize, usize)> = shared
        .into_iter()
        .filter(|&(_, count)| count >= MIN_SHARED_FINGERPRINT)
        .map(|(pair, _)| pair)
        .collect();
    pairs.sort_unstable();
    for (a, b) in pairs {
        let len_a = messages[candidates[a]].content_chars() as f64;
        let len_b = messages[candidates[b]].content_chars() as f64;
        if len_a.min(len_b) / len_a.max(len_b) < MIN_LENGTH_RATIO {
            continue;
        }
        if line_jaccard(&freqs[a], &freqs[b]) >= cfg.fuzzy_threshold {
            dsu.union(a, b);
        }
    }

    // Collect groups in message order.
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &slot in &usable {
        groups.entry(dsu.find(slot)).or_default().push(slot);
    }
    for slots in groups.into_values().filter(|g| g.len() >= 2) {
        let positions: Vec<usize> = slots.iter().map(|&s| candidates[s]).collect();
        let keep = keep_target(&positions, messages.len(), cfg.recency_window);
        let keep_slot = slots[positions
            .iter()
            .position(|&p| p == keep)
            .expect("keep target is a group member")];
        outcome.keep_targets.insert(keep);
        for (&slot, &i) in slots.iter().zip(&positions) {
            if i == keep || in_window(i, messages.len(), cfg.recency_window) {
                continue;
            }
            let similarity = line_jaccard(&freqs[slot], &freqs[keep_slot]);
            let marker = format!(
                "[cce:near-dup of {} — {} chars, ~{}% match]",
                messages[keep].id,
                messages[i].content_chars(),
                (similarity * 100.0).round() as u32
            );
            outcome.rewrites.insert(
                i,
                DupRewrite {
                    marker,
                    kind: DupKind::Fuzzy,
                },
            );
        }
    }
}

/// Disjoint-set union with path compression and union by rank.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(window: usize, fuzzy: bool) -> DedupConfig<'static> {
        DedupConfig {
            preserve: &[],
            recency_window: window,
            exact: true,
            fuzzy,
            fuzzy_threshold: 0.85,
        }
    }

    fn prose(n: usize, seed: &str) -> String {
        format!("{seed} ").repeat(n)
    }

    #[test]
    fn test_exact_dup_marks_earlier_keeps_latest() {
        let body = prose(40, "repeated answer");
        let messages = vec![
            Message::new("a", "user", body.clone()),
            Message::new("b", "user", "something unrelated and long enough? no"),
            Message::new("c", "user", body.clone()),
        ];
        let out = deduplicate(&messages, &cfg(0, false));
        assert_eq!(out.count(DupKind::Exact), 1);
        assert!(out.keep_targets.contains(&2));
        let rewrite = out.rewrites.get(&0).unwrap();
        assert_eq!(
            rewrite.marker,
            format!("[cce:dup of c — {} chars]", body.chars().count())
        );
    }

    #[test]
    fn test_keep_target_prefers_window() {
        let body = prose(40, "repeated answer");
        let messages = vec![
            Message::new("a", "user", body.clone()),
            Message::new("b", "user", body.clone()),
            Message::new("c", "user", body.clone()),
        ];
        // Window covers only the last message; it becomes the keep target.
        let out = deduplicate(&messages, &cfg(1, false));
        assert!(out.keep_targets.contains(&2));
        assert!(out.rewrites.contains_key(&0));
        assert!(out.rewrites.contains_key(&1));
    }

    #[test]
    fn test_short_content_not_eligible() {
        let messages = vec![
            Message::new("a", "user", "short duplicate"),
            Message::new("b", "user", "short duplicate"),
        ];
        let out = deduplicate(&messages, &cfg(0, false));
        assert!(out.rewrites.is_empty());
    }

    #[test]
    fn test_tool_call_messages_not_eligible() {
        let body = prose(40, "tool output");
        let mut a = Message::new("a", "assistant", body.clone());
        a.tool_calls = Some(vec![serde_json::json!({"name": "shell"})]);
        let mut b = Message::new("b", "assistant", body);
        b.tool_calls = Some(vec![serde_json::json!({"name": "shell"})]);
        let out = deduplicate(&[a, b], &cfg(0, false));
        assert!(out.rewrites.is_empty());
    }

    #[test]
    fn test_fuzzy_near_duplicates_grouped() {
        let base: String = (0..12)
            .map(|i| format!("shared line number {i} with stable words\n"))
            .collect();
        let variant = format!("{base}one extra divergent trailing line\n");
        let messages = vec![
            Message::new("a", "assistant", base.clone()),
            Message::new("b", "assistant", variant),
        ];
        let out = deduplicate(&messages, &cfg(0, true));
        assert_eq!(out.count(DupKind::Fuzzy), 1);
        let rewrite = out.rewrites.get(&0).unwrap();
        assert_eq!(rewrite.kind, DupKind::Fuzzy);
        assert!(rewrite.marker.starts_with("[cce:near-dup of b — "));
        assert!(rewrite.marker.contains("% match]"));
    }

    #[test]
    fn test_fuzzy_respects_length_ratio() {
        let base: String = (0..6)
            .map(|i| format!("shared line number {i} with stable words\n"))
            .collect();
        let much_longer = format!("{}{}", base, prose(60, "padding trailing away"));
        let messages = vec![
            Message::new("a", "assistant", base),
            Message::new("b", "assistant", much_longer),
        ];
        let out = deduplicate(&messages, &cfg(0, true));
        assert!(out.rewrites.is_empty());
    }

    #[test]
    fn test_exact_dups_excluded_from_fuzzy() {
        let body: String = (0..10)
            .map(|i| format!("identical content line {i}\n"))
            .collect();
        let messages = vec![
            Message::new("a", "assistant", body.clone()),
            Message::new("b", "assistant", body),
        ];
        let out = deduplicate(&messages, &cfg(0, true));
        assert_eq!(out.count(DupKind::Exact), 1);
        assert_eq!(out.count(DupKind::Fuzzy), 0);
    }

    #[test]
    fn test_disjoint_set_transitive() {
        let mut dsu = DisjointSet::new(4);
        dsu.union(0, 1);
        dsu.union(1, 2);
        assert_eq!(dsu.find(0), dsu.find(2));
        assert_ne!(dsu.find(0), dsu.find(3));
    }
}
