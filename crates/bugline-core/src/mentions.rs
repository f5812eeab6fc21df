//! Inline @mention extraction from comment and description text.
//!
//! Extraction is pure and deterministic: no I/O, no subject lookup. The
//! pipeline resolves the returned names against the subject table afterwards
//! and silently drops names that match nobody.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_@])@([A-Za-z0-9_]+)").unwrap());

static CODE_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-z]*\n.*?```").unwrap());

static INLINE_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());

/// Extract @mentions from free text.
///
/// Returns lowercase, deduplicated, sorted identifiers.
///
/// # Rules
///
/// 1. A mention is `@` followed by alphanumerics/underscore
/// 2. `@` must not be preceded by an identifier character (so
///    `mail@example` is not a mention of `example`)
/// 3. Numeric-only identifiers are excluded (e.g., `@123`)
/// 4. Fenced code blocks and inline code are excluded
/// 5. Names are normalized to lowercase and deduplicated
///
/// # Examples
///
/// ```
/// use bugline_core::mentions::extract_mentions;
///
/// let names = extract_mentions("ping @alice and @Bob_42, then @alice again");
/// assert_eq!(names, vec!["alice".to_string(), "bob_42".to_string()]);
/// ```
pub fn extract_mentions(text: &str) -> Vec<String> {
    let without_code_blocks = CODE_BLOCK_PATTERN.replace_all(text, "");
    let without_inline_code = INLINE_CODE_PATTERN.replace_all(&without_code_blocks, "");

    let mut names = HashSet::new();

    for cap in MENTION_PATTERN.captures_iter(&without_inline_code) {
        if let Some(name) = cap.get(1) {
            let name_str = name.as_str();

            // Skip numeric-only identifiers (issue references, not people)
            if name_str.chars().all(|c| c.is_numeric()) {
                continue;
            }

            names.insert(name_str.to_lowercase());
        }
    }

    let mut result: Vec<String> = names.into_iter().collect();
    result.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_basic_mentions() {
        let names = extract_mentions("cc @alice, @bob should look at this");
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_deduplicates_repeated_mentions() {
        let names = extract_mentions("@alice @alice @ALICE");
        assert_eq!(names, vec!["alice"]);
    }

    #[test]
    fn test_underscore_and_digits_allowed() {
        let names = extract_mentions("assigning to @qa_bot_2");
        assert_eq!(names, vec!["qa_bot_2"]);
    }

    #[test]
    fn test_numeric_only_excluded() {
        let names = extract_mentions("see @123 and @456");
        assert!(names.is_empty());
    }

    #[test]
    fn test_email_address_not_a_mention() {
        let names = extract_mentions("contact me at alice@example.com");
        assert!(names.is_empty());
    }

    #[test]
    fn test_mention_at_start_of_text() {
        let names = extract_mentions("@carol can you triage?");
        assert_eq!(names, vec!["carol"]);
    }

    #[test]
    fn test_code_blocks_excluded() {
        let text = "real: @alice\n```rust\nlet x = @bob; // not a mention\n```\n";
        let names = extract_mentions(text);
        assert_eq!(names, vec!["alice"]);
    }

    #[test]
    fn test_inline_code_excluded() {
        let names = extract_mentions("use `@derive` macro, ask @dana");
        assert_eq!(names, vec!["dana"]);
    }

    #[test]
    fn test_punctuation_boundary() {
        let names = extract_mentions("(@eve) and @frank. done");
        assert_eq!(names, vec!["eve", "frank"]);
    }

    #[test]
    fn test_empty_and_plain_text() {
        assert!(extract_mentions("").is_empty());
        assert!(extract_mentions("no mentions here").is_empty());
    }
}
