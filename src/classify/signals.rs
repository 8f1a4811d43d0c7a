//! Soft informational signals.
//!
//! These never prevent compression; they flag content the entity extractor
//! should fish back out of the original text (URLs, versions, hashes, ...).

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

use super::detectors::word_bounded_pattern_ids;

/// Informational markers recorded on compressible messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftSignal {
    Url,
    Email,
    Phone,
    SemVer,
    HexHash,
    FilePath,
    DottedNumber,
    QuotedKey,
    LegalTerm,
    NumericWithUnits,
}

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap());
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap());
static SEMVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bv?\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?\b").unwrap());
static HEX_HASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-f]{7,64}\b").unwrap());
static FILE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|[\s"'(`])/?(?:[\w.-]+/)+[\w.-]+"#).unwrap());
static DOTTED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+){2,}\b").unwrap());
static QUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[\w-]+"\s*:"#).unwrap());
static NUMERIC_UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b\d+(?:\.\d+)?\s*(?:ms|sec|secs|min|mins|hr|hrs|h|s|KB|MB|GB|TB|kb|mb|gb|tb)\b|\b\d+(?:\.\d+)?%)").unwrap()
});

static LEGAL_TERMS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "pursuant",
            "herein",
            "thereof",
            "whereas",
            "indemnify",
            "liability",
            "warranty",
            "jurisdiction",
            "hereby",
            "notwithstanding",
        ])
        .unwrap()
});

/// Scan compressible content for informational markers.
pub(crate) fn detect_signals(text: &str) -> Vec<SoftSignal> {
    let mut out = Vec::new();
    if URL.is_match(text) {
        out.push(SoftSignal::Url);
    }
    if EMAIL.is_match(text) {
        out.push(SoftSignal::Email);
    }
    if PHONE.is_match(text) {
        out.push(SoftSignal::Phone);
    }
    if SEMVER.is_match(text) {
        out.push(SoftSignal::SemVer);
    }
    // Long decimal runs satisfy the hex class; require a hex letter so
    // phone numbers and ids do not read as digests.
    if HEX_HASH
        .find_iter(text)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_alphabetic()))
    {
        out.push(SoftSignal::HexHash);
    }
    if FILE_PATH.is_match(text) {
        out.push(SoftSignal::FilePath);
    }
    if DOTTED_NUMBER.is_match(text) {
        out.push(SoftSignal::DottedNumber);
    }
    if QUOTED_KEY.is_match(text) {
        out.push(SoftSignal::QuotedKey);
    }
    if !word_bounded_pattern_ids(&LEGAL_TERMS, text).is_empty() {
        out.push(SoftSignal::LegalTerm);
    }
    if NUMERIC_UNITS.is_match(text) {
        out.push(SoftSignal::NumericWithUnits);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_and_email() {
        let signals = detect_signals("see https://example.com or mail ops@example.com");
        assert!(signals.contains(&SoftSignal::Url));
        assert!(signals.contains(&SoftSignal::Email));
    }

    #[test]
    fn test_semver_and_dotted() {
        let signals = detect_signals("upgrade from 1.2.3 before trying 10.0.0.1");
        assert!(signals.contains(&SoftSignal::SemVer));
        assert!(signals.contains(&SoftSignal::DottedNumber));
    }

    #[test]
    fn test_hex_hash_requires_letter() {
        assert!(detect_signals("commit deadbeef123 fixed it")
            .contains(&SoftSignal::HexHash));
        assert!(!detect_signals("call 12345678901 today")
            .contains(&SoftSignal::HexHash));
    }

    #[test]
    fn test_file_path_and_units() {
        let signals = detect_signals("took 150 ms to parse src/classify/mod.rs fully");
        assert!(signals.contains(&SoftSignal::FilePath));
        assert!(signals.contains(&SoftSignal::NumericWithUnits));
    }

    #[test]
    fn test_legal_terms_word_bounded() {
        assert!(detect_signals("the parties shall indemnify each other")
            .contains(&SoftSignal::LegalTerm));
        assert!(!detect_signals("whereabouts unknown").contains(&SoftSignal::LegalTerm));
    }

    #[test]
    fn test_plain_prose_has_no_signals() {
        assert!(detect_signals("a calm sentence about nothing in particular").is_empty());
    }
}
