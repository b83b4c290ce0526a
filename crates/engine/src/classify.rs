// crates/engine/src/classify.rs
//! Markdown-vs-plain-text classification for free-form assistant output.
//!
//! A fixed, ordered set of pattern checks; the first hit wins. Pure and
//! deterministic so re-parsing a session always classifies identically.

use regex_lite::Regex;
use std::sync::OnceLock;

fn markdown_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)```",                      // fenced code block
            r"(?m)^#{1,6}\s+\S",             // heading
            r"\*\*[^*\n]+\*\*",              // bold
            r"(?m)(^|\s)\*[^*\s][^*\n]*\*",  // italic
            r"`[^`\n]+`",                    // inline code
            r"\[[^\]\n]+\]\([^)\n]+\)",      // link
            r"(?m)^\s*[-*+]\s+\S",           // unordered list item
            r"(?m)^\s*\d+\.\s+\S",           // ordered list item
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Whether free text should render as Markdown rather than plain text.
/// Blank text is never Markdown.
pub fn is_markdown(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    markdown_patterns().iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_markdown() {
        assert!(!is_markdown("plain sentence"));
        assert!(!is_markdown("a longer plain sentence, with punctuation."));
    }

    #[test]
    fn blank_is_never_markdown() {
        assert!(!is_markdown(""));
        assert!(!is_markdown("   \n\t"));
    }

    #[test]
    fn common_markdown_constructs_match() {
        assert!(is_markdown("**bold**"));
        assert!(is_markdown("some `code` inline"));
        assert!(is_markdown("- item"));
        assert!(is_markdown("1. first"));
        assert!(is_markdown("# Heading"));
        assert!(is_markdown("see [docs](https://example.com)"));
        assert!(is_markdown("```rust\nfn main() {}\n```"));
        assert!(is_markdown("this is *emphasis* here"));
    }

    #[test]
    fn near_misses_stay_plain() {
        // a * b is multiplication, not emphasis
        assert!(!is_markdown("compute a * b now"));
        // hash inside a word is not a heading
        assert!(!is_markdown("issue #42 fixed"));
    }

    #[test]
    fn deterministic() {
        let text = "mixed **bold** and - item";
        assert_eq!(is_markdown(text), is_markdown(text));
    }
}
