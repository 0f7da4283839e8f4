//! Language tag parsing and language-driven policies.

/// Deprecated codes still sent by some pages, mapped to their current form.
const LANG_MAP: &[(&str, &str)] = &[("iw", "he")];

const RTL_LANGS: &[&str] = &["ar", "az", "dv", "he", "iw", "ku", "fa", "ur"];

const EAST_ASIAN_LANGS: &[&str] = &["zh", "ko", "ja"];

/// A BCP-47-like tag split into its primary subtag and the rest.
///
/// Both parts are lowercased; `-` and `_` are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTag {
    pub primary: String,
    pub rest: Option<String>,
}

impl LanguageTag {
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase().replace('_', "-");
        let mut parts = normalized.splitn(2, '-');
        let primary = parts.next().unwrap_or_default().to_string();
        let rest = parts.next().filter(|r| !r.is_empty()).map(str::to_string);
        Self { primary, rest }
    }

    pub fn is_east_asian(&self) -> bool {
        EAST_ASIAN_LANGS.contains(&self.primary.as_str())
    }

    pub fn is_rtl(&self) -> bool {
        RTL_LANGS.contains(&self.primary.as_str())
    }

    pub fn is_english_us(&self) -> bool {
        self.primary == "en" && self.rest.as_deref() == Some("us")
    }
}

/// Normalize a page language, falling back to `default` when absent.
pub fn speech_lang(lang: Option<&str>, default: &str) -> String {
    match lang.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => LANG_MAP
            .iter()
            .find(|(from, _)| *from == lang)
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| lang.to_string()),
        None => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_and_separator_insensitive() {
        assert_eq!(LanguageTag::parse("en_GB"), LanguageTag::parse("EN-gb"));
        let tag = LanguageTag::parse("zh-Hant-TW");
        assert_eq!(tag.primary, "zh");
        assert_eq!(tag.rest.as_deref(), Some("hant-tw"));
        assert_eq!(LanguageTag::parse("fr").rest, None);
    }

    #[test]
    fn test_language_policies() {
        assert!(LanguageTag::parse("ja-JP").is_east_asian());
        assert!(!LanguageTag::parse("kok").is_east_asian());
        assert!(LanguageTag::parse("he").is_rtl());
        assert!(LanguageTag::parse("en-us").is_english_us());
    }

    #[test]
    fn test_speech_lang_mapping() {
        assert_eq!(speech_lang(Some("iw"), "en-US"), "he");
        assert_eq!(speech_lang(Some(""), "en-US"), "en-US");
        assert_eq!(speech_lang(None, "en-US"), "en-US");
        assert_eq!(speech_lang(Some("de-AT"), "en-US"), "de-AT");
    }
}
