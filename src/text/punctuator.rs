//! Language-specific punctuation rules.
//!
//! Each level splits on a delimiter pattern and keeps the delimiter attached to
//! the text before it, so joining the pieces gives back the input.

use std::sync::LazyLock;

use regex::Regex;

use crate::lang::LanguageTag;

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n\s*){2,}").unwrap());

static LATIN_SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+[\s\x{200b}]+").unwrap());

/// A sentence piece ending like this was cut at an abbreviation, not a sentence end.
static LATIN_ABBREVIATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\w|[A-Z][a-z]|Assn|Ave|Capt|Col|Comdr|Corp|Cpl|Gen|Gov|Hon|Inc|Lieut|Ltd|Rev|Univ|Jan|Feb|Mar|Apr|Aug|Sept|Oct|Nov|Dec|dept|ed|est|vol|vs)\.\s+$",
    )
    .unwrap()
});

static LATIN_PHRASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;:]\s+|\s-+\s+|—\s*").unwrap());

static EAST_ASIAN_SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+[\s\x{200b}]+|[\x{3002}\x{ff01}]+").unwrap());

static EAST_ASIAN_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[,;:]\s+|[\x{2025}\x{2026}\x{3000}\x{3001}\x{ff0c}\x{ff1b}]+").unwrap()
});

/// Symbols that become chunks of their own.
const SYMBOLS: &[char] = &['~', '@', '#', '%', '^', '*', '_', '+', '=', '<', '>'];

pub trait Punctuator: Send + Sync {
    fn paragraphs(&self, text: &str) -> Vec<String>;
    fn sentences(&self, text: &str) -> Vec<String>;
    fn phrases(&self, sentence: &str) -> Vec<String>;
    fn words(&self, phrase: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunctuationStyle {
    Latin,
    EastAsian,
}

impl PunctuationStyle {
    pub fn for_language(tag: &LanguageTag) -> Self {
        if tag.is_east_asian() {
            Self::EastAsian
        } else {
            Self::Latin
        }
    }

    pub fn punctuator(self) -> Box<dyn Punctuator> {
        match self {
            Self::Latin => Box::new(LatinPunctuator),
            Self::EastAsian => Box::new(EastAsianPunctuator),
        }
    }
}

pub struct LatinPunctuator;

impl Punctuator for LatinPunctuator {
    fn paragraphs(&self, text: &str) -> Vec<String> {
        recombine(&split_keep(text, &PARAGRAPH_RE), None)
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        recombine(
            &split_keep(text, &LATIN_SENTENCE_RE),
            Some(&LATIN_ABBREVIATION_RE),
        )
    }

    fn phrases(&self, sentence: &str) -> Vec<String> {
        recombine(&split_keep(sentence, &LATIN_PHRASE_RE), None)
    }

    fn words(&self, phrase: &str) -> Vec<String> {
        let chars: Vec<char> = phrase.trim().chars().collect();
        let mut result: Vec<String> = Vec::new();
        let mut word = String::new();
        let mut i = 0;

        // Regex has no look-ahead, so the word breaks are scanned by hand.
        while i < chars.len() {
            let c = chars[i];
            if SYMBOLS.contains(&c) {
                flush_word(&mut word, &mut result);
                result.push(c.to_string());
                i += 1;
            } else if is_word_break(c) {
                let start = i;
                while i < chars.len() && is_word_break(chars[i]) {
                    i += 1;
                }
                flush_word(&mut word, &mut result);
                attach_delimiter(&mut result, chars[start..i].iter().collect());
            } else if (c == '.' && followed_by_word_chars(&chars, i + 1, 2))
                || (c == ',' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
            {
                flush_word(&mut word, &mut result);
                attach_delimiter(&mut result, c.to_string());
                i += 1;
            } else {
                word.push(c);
                i += 1;
            }
        }
        flush_word(&mut word, &mut result);
        result
    }
}

pub struct EastAsianPunctuator;

impl Punctuator for EastAsianPunctuator {
    fn paragraphs(&self, text: &str) -> Vec<String> {
        recombine(&split_keep(text, &PARAGRAPH_RE), None)
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        recombine(&split_keep(text, &EAST_ASIAN_SENTENCE_RE), None)
    }

    fn phrases(&self, sentence: &str) -> Vec<String> {
        recombine(&split_keep(sentence, &EAST_ASIAN_PHRASE_RE), None)
    }

    fn words(&self, phrase: &str) -> Vec<String> {
        phrase
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()
    }
}

/// Split on `re`, returning `[text, delim, text, delim, ..., text]`.
fn split_keep<'a>(text: &'a str, re: &Regex) -> Vec<&'a str> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        tokens.push(&text[last..m.start()]);
        tokens.push(m.as_str());
        last = m.end();
    }
    tokens.push(&text[last..]);
    tokens
}

/// Glue each delimiter back onto its text. With `non_breaking`, a piece that
/// matches it absorbs the piece after it.
fn recombine(tokens: &[&str], non_breaking: Option<&Regex>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for pair in tokens.chunks(2) {
        let part = pair.concat();
        if part.is_empty() {
            continue;
        }
        let absorb = match (non_breaking, result.last()) {
            (Some(re), Some(last)) => re.is_match(last),
            _ => false,
        };
        if absorb {
            if let Some(last) = result.last_mut() {
                last.push_str(&part);
                continue;
            }
        }
        result.push(part);
    }
    result
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || c == '-' || c == '—' || c == '/'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn followed_by_word_chars(chars: &[char], from: usize, n: usize) -> bool {
    chars.len() >= from + n && chars[from..from + n].iter().all(|&c| is_word_char(c))
}

fn flush_word(word: &mut String, result: &mut Vec<String>) {
    if !word.is_empty() {
        result.push(std::mem::take(word));
    }
}

fn attach_delimiter(result: &mut [String], delimiter: String) {
    if let Some(last) = result.last_mut() {
        last.push_str(&delimiter);
    }
}
