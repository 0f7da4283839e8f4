//! Text segmentation: turns selected text into speakable chunks.
//!
//! - `preprocess`: repeated-character truncation, URL masking, terminal punctuation
//! - `punctuator`: Latin and East-Asian paragraph/sentence/phrase/word splitters
//! - `breaker`: four-level hierarchical chunker bounded by a character budget

pub mod breaker;
pub mod preprocess;
pub mod punctuator;

pub use breaker::CharBreaker;
pub use punctuator::PunctuationStyle;

/// Split `text` into chunks of at most `char_limit` characters using the
/// punctuation rules of `style`. Empty (or whitespace-only) text yields no chunks.
pub fn segment(
    text: &str,
    char_limit: usize,
    combine_threshold: Option<usize>,
    style: PunctuationStyle,
) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let punctuator = style.punctuator();
    CharBreaker::new(char_limit, punctuator.as_ref(), combine_threshold).break_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "The quick brown fox jumps over the lazy dog. It was not amused, \
        and it said so: loudly, clearly - and at length! Dr. Watson took notes.\n\n\
        Meanwhile the second paragraph rambles on about nothing in particular; \
        commas, semicolons, and dashes — all of them — appear here. \
        Supercalifragilisticexpialidocious-and-then-some is long.";

    fn strip_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_is_one_trimmed_chunk() {
        let chunks = segment("  Hello there, world.  ", 200, None, PunctuationStyle::Latin);
        assert_eq!(chunks, vec!["Hello there, world."]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(segment("", 200, None, PunctuationStyle::Latin).is_empty());
        assert!(segment(" \n\n ", 200, None, PunctuationStyle::EastAsian).is_empty());
    }

    #[test]
    fn test_every_chunk_fits_the_limit() {
        for limit in [5, 12, 30, 80, 200] {
            for style in [PunctuationStyle::Latin, PunctuationStyle::EastAsian] {
                for chunk in segment(SAMPLE, limit, Some(limit / 2 + 1), style) {
                    assert!(
                        chunk.chars().count() <= limit,
                        "chunk {chunk:?} exceeds {limit}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_threshold_above_limit_still_respects_limit() {
        for chunk in segment(SAMPLE, 40, Some(500), PunctuationStyle::Latin) {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn test_chunks_reassemble_to_source() {
        for limit in [7, 25, 60, 750] {
            let chunks = segment(SAMPLE, limit, None, PunctuationStyle::Latin);
            assert_eq!(strip_whitespace(&chunks.concat()), strip_whitespace(SAMPLE), "limit {limit}");
        }
    }

    #[test]
    fn test_east_asian_text_splits_on_full_width_punctuation() {
        let text = "今日は良い天気です。明日も晴れるでしょう。";
        let chunks = segment(text, 12, None, PunctuationStyle::EastAsian);
        assert_eq!(chunks, vec!["今日は良い天気です。", "明日も晴れるでしょう。"]);
    }
}
