//! Paragraph and sentence segmentation for the deterministic summarizer.
//!
//! Paragraphs split on blank lines; sentences split on `.?!` boundaries
//! followed by whitespace, with a short abbreviation list so "e.g." and
//! honorifics do not end sentences. Decimal points never split because a
//! digit, not whitespace, follows them.

/// A sentence with its paragraph and global position.
#[derive(Debug, Clone)]
pub(crate) struct Sentence {
    pub text: String,
    pub paragraph: usize,
    pub position: usize,
}

/// Trailing words (lowercased, final period stripped) that do not end a
/// sentence.
const ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "dr", "mr", "mrs", "ms", "prof", "st", "jr", "sr", "vs", "cf", "etc",
    "approx", "no", "fig", "inc", "ltd", "dept", "est",
];

/// Split text into sentences, paragraph-aware, positions global.
pub(crate) fn split_into_sentences(text: &str) -> Vec<Sentence> {
    let mut out = Vec::new();
    let mut position = 0usize;
    for (paragraph, para) in split_paragraphs(text).iter().enumerate() {
        for text in split_sentences(para) {
            out.push(Sentence {
                text,
                paragraph,
                position,
            });
            position += 1;
        }
    }
    out
}

/// Split on blank lines; single newlines stay inside a paragraph.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for i in 0..chars.len() {
        let c = chars[i];
        if c != '.' && c != '?' && c != '!' {
            continue;
        }
        let at_end = i + 1 >= chars.len();
        if !at_end && !chars[i + 1].is_whitespace() {
            continue;
        }
        if c == '.' && is_abbreviation(&chars[start..i]) {
            continue;
        }
        let sentence: String = chars[start..=i].iter().collect();
        let sentence = sentence.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = i + 1;
    }
    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        let tail = tail.trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }
    sentences
}

/// True when the word ending at the candidate period is an abbreviation or
/// a single-letter initial.
fn is_abbreviation(before: &[char]) -> bool {
    let word_start = before
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|p| p + 1)
        .unwrap_or(0);
    let word: String = before[word_start..]
        .iter()
        .skip_while(|c| !c.is_alphanumeric())
        .collect();
    if word.is_empty() {
        return false;
    }
    if word.chars().count() == 1 && word.chars().all(|c| c.is_alphabetic()) {
        return true;
    }
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}
