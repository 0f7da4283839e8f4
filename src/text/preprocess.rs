//! Clean-up applied to source text before it is chunked.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Marker spoken in place of a bare URL.
pub const URL_MARKER: &str = "HTTP URL.";

/// Limit runs of the same character to `max` repeats ("!!!!!!" → "!!!").
pub fn truncate_repeated_chars(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    let mut count = 0;
    for c in text.chars() {
        if prev == Some(c) {
            count += 1;
        } else {
            prev = Some(c);
            count = 1;
        }
        if count <= max {
            out.push(c);
        }
    }
    out
}

pub fn replace_urls(text: &str) -> String {
    URL_RE.replace_all(text, URL_MARKER).into_owned()
}

/// Per-unit clean-up done by the document controller.
pub fn preprocess(text: &str) -> String {
    replace_urls(&truncate_repeated_chars(text, 3))
}

/// Give the engine a sentence end to pause on when the text stops on a word.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    match text.chars().last() {
        Some(c) if c.is_alphanumeric() || c == '_' || c == ')' => format!("{text}."),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_repeated_chars() {
        assert_eq!(truncate_repeated_chars("aaaaaaa!!!", 3), "aaa!!!");
        assert_eq!(truncate_repeated_chars("zzzzzz…", 3), "zzz…");
        assert_eq!(truncate_repeated_chars("bookkeeper", 3), "bookkeeper");
        assert_eq!(truncate_repeated_chars("", 3), "");
    }

    #[test]
    fn test_replace_urls() {
        assert_eq!(
            preprocess("See https://example.com/a?b=c for more"),
            "See HTTP URL. for more"
        );
    }

    #[test]
    fn test_terminal_punctuation() {
        assert_eq!(ensure_terminal_punctuation("Hello"), "Hello.");
        assert_eq!(ensure_terminal_punctuation("(see above)"), "(see above).");
        assert_eq!(ensure_terminal_punctuation("Done!"), "Done!");
        assert_eq!(ensure_terminal_punctuation(""), "");
    }
}
