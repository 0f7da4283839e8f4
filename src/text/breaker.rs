//! Hierarchical chunker: paragraphs → sentences → phrases → words → slices.
//!
//! A unit is only broken down to the next level when it exceeds the
//! character limit; consecutive small units are merged back into one chunk.

use super::punctuator::Punctuator;

pub struct CharBreaker<'a> {
    char_limit: usize,
    punctuator: &'a dyn Punctuator,
    paragraph_combine_threshold: Option<usize>,
}

impl<'a> CharBreaker<'a> {
    pub fn new(
        char_limit: usize,
        punctuator: &'a dyn Punctuator,
        paragraph_combine_threshold: Option<usize>,
    ) -> Self {
        Self {
            char_limit: char_limit.max(1),
            punctuator,
            paragraph_combine_threshold,
        }
    }

    pub fn break_text(&self, text: &str) -> Vec<String> {
        self.merge(
            self.punctuator.paragraphs(text),
            |p| self.break_paragraph(p),
            self.paragraph_combine_threshold,
        )
    }

    fn break_paragraph(&self, paragraph: &str) -> Vec<String> {
        self.merge(
            self.punctuator.sentences(paragraph),
            |s| self.break_sentence(s),
            None,
        )
    }

    fn break_sentence(&self, sentence: &str) -> Vec<String> {
        self.merge(
            self.punctuator.phrases(sentence),
            |p| self.break_phrase(p),
            None,
        )
    }

    fn break_phrase(&self, phrase: &str) -> Vec<String> {
        self.merge(self.punctuator.words(phrase), |w| self.break_word(w), None)
    }

    /// Last resort: fixed-size slices with no regard for meaning.
    fn break_word(&self, word: &str) -> Vec<String> {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(self.char_limit)
            .map(|slice| slice.iter().collect())
            .collect()
    }

    fn merge(
        &self,
        parts: Vec<String>,
        break_part: impl Fn(&str) -> Vec<String>,
        combine_threshold: Option<usize>,
    ) -> Vec<String> {
        // Grouping never produces a chunk over the hard limit.
        let threshold = combine_threshold.unwrap_or(self.char_limit).min(self.char_limit);
        let mut result = Vec::new();
        let mut group = String::new();
        let mut group_chars = 0;

        for part in parts {
            let char_count = part.chars().count();
            if char_count > self.char_limit {
                flush(&mut group, &mut group_chars, &mut result);
                result.extend(break_part(&part));
            } else {
                if group_chars + char_count > threshold {
                    flush(&mut group, &mut group_chars, &mut result);
                }
                group.push_str(&part);
                group_chars += char_count;
            }
        }
        flush(&mut group, &mut group_chars, &mut result);
        result
    }
}

fn flush(group: &mut String, group_chars: &mut usize, result: &mut Vec<String>) {
    if !group.is_empty() {
        result.push(std::mem::take(group));
        *group_chars = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::punctuator::LatinPunctuator;

    #[test]
    fn test_long_word_is_hard_sliced() {
        let breaker = CharBreaker::new(4, &LatinPunctuator, None);
        assert_eq!(breaker.break_text("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_sentences_merge_up_to_limit() {
        let breaker = CharBreaker::new(30, &LatinPunctuator, None);
        let chunks = breaker.break_text("One two. Three four. Five six seven eight nine.");
        assert_eq!(chunks, vec!["One two. Three four. ", "Five six seven eight nine."]);
    }

    #[test]
    fn test_paragraph_threshold_limits_grouping() {
        let text = "Para one.\n\nPara two.\n\nPara three.";
        let grouped = CharBreaker::new(750, &LatinPunctuator, None).break_text(text);
        assert_eq!(grouped.len(), 1);

        let split = CharBreaker::new(750, &LatinPunctuator, Some(12)).break_text(text);
        assert_eq!(split, vec!["Para one.\n\n", "Para two.\n\n", "Para three."]);
    }
}
