//! Code-aware splitting of a single message.
//!
//! Separates fenced code from prose so the prose can be summarized while
//! the fences pass through byte-identically. Scanning is line-based rather
//! than regex-based: segments are exact substrings of the input, so
//! concatenating them reproduces the message and reassembled fences carry
//! their original bytes.

/// One run of the message: prose between fences, or a whole fenced block
/// including its delimiter lines.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Prose(String),
    Fence(String),
}

/// Split content on non-nested triple-backtick fences.
///
/// An unclosed fence extends to the end of the input.
pub(crate) fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        let is_delimiter = line.trim_start().starts_with("```");
        if !in_fence && is_delimiter {
            if !current.is_empty() {
                segments.push(Segment::Prose(std::mem::take(&mut current)));
            }
            in_fence = true;
            current.push_str(line);
        } else if in_fence && is_delimiter {
            current.push_str(line);
            segments.push(Segment::Fence(std::mem::take(&mut current)));
            in_fence = false;
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        segments.push(if in_fence {
            Segment::Fence(current)
        } else {
            Segment::Prose(current)
        });
    }
    segments
}

/// Total trimmed length of the prose surrounding fences.
pub(crate) fn prose_char_len(text: &str) -> usize {
    split_segments(text)
        .iter()
        .map(|seg| match seg {
            Segment::Prose(p) => p.trim().chars().count(),
            Segment::Fence(_) => 0,
        })
        .sum()
}

/// Summarize the prose of a code-split message and collect its fences.
///
/// Returns the prose summary text (no entity suffix; the fences carry the
/// identifiers already) and each fence trimmed of its trailing newline,
/// ready for `\n\n` joining by the caller.
pub(crate) fn code_split_parts(text: &str) -> (String, Vec<String>) {
    let segments = split_segments(text);
    let prose: Vec<&str> = segments
        .iter()
        .filter_map(|seg| match seg {
            Segment::Prose(p) => {
                let trimmed = p.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            Segment::Fence(_) => None,
        })
        .collect();
    let fences: Vec<String> = segments
        .iter()
        .filter_map(|seg| match seg {
            Segment::Fence(f) => Some(f.trim_end_matches('\n').to_string()),
            Segment::Prose(_) => None,
        })
        .collect();

    let joined = prose.join("\n\n");
    let summary = crate::summarize::summarize(&joined).text;
    (summary, fences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_segments_reassemble_exactly() {
        let text = "intro prose\n```ts\nlet x=1;\n```\nmiddle\n```\nraw\n```\ntail";
        let segments = split_segments(text);
        let rebuilt: String = segments
            .iter()
            .map(|s| match s {
                Segment::Prose(p) | Segment::Fence(p) => p.as_str(),
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_fence_boundaries() {
        let text = "before\n```rust\nfn main() {}\n```\nafter";
        let segments = split_segments(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[1],
            Segment::Fence("```rust\nfn main() {}\n```\n".to_string())
        );
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let text = "prose\n```python\nprint('hi')";
        let segments = split_segments(text);
        assert_eq!(segments.len(), 2);
        assert!(matches!(&segments[1], Segment::Fence(f) if f.contains("print")));
    }

    #[test]
    fn test_prose_char_len_ignores_fences() {
        let text = "12345\n```\ncode code code\n```\n67890";
        assert_eq!(prose_char_len(text), 10);
    }

    #[test]
    fn test_code_split_keeps_fences_byte_identical() {
        let fence = "```ts\nlet x=1;\n```";
        let prose = "This paragraph explains the snippet in enough detail that the \
                     splitter will choose to keep the code and shorten the words.";
        let text = format!("{prose}\n\n{fence}\n\nmore trailing discussion");
        let (_summary, fences) = code_split_parts(&text);
        assert_eq!(fences, vec![fence.to_string()]);
    }
}
