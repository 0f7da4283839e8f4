//! Voices and voice resolution across engines.

use serde::{Deserialize, Serialize};

use crate::engine::EngineKind;
use crate::error::PlaybackError;
use crate::lang::LanguageTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub name: String,
    /// `None` means the voice claims to handle any language.
    pub lang: Option<String>,
    pub gender: Option<Gender>,
    /// Ask the engine to pick the region/variant itself.
    #[serde(default)]
    pub auto_select: bool,
    pub engine: EngineKind,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: Option<&str>, engine: EngineKind) -> Self {
        Self {
            name: name.into(),
            lang: lang.map(str::to_string),
            gender: None,
            auto_select: false,
            engine,
        }
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }
}

pub fn find_voice_by_name<'a>(voices: &'a [Voice], name: &str) -> Option<&'a Voice> {
    voices.iter().find(|v| v.name == name)
}

/// Best voice for `lang` within `voices`.
///
/// Precedence, first non-empty category wins:
/// 1. same dialect, female
/// 2. same dialect
/// 3. voice declares no dialect
/// 4. en-US requested, voice is some other English
/// 5. voice declares no language
/// 6. any other dialect of the language
pub fn find_voice_by_lang<'a, I>(voices: I, lang: &str) -> Option<&'a Voice>
where
    I: IntoIterator<Item = &'a Voice>,
{
    let wanted = LanguageTag::parse(lang);
    let mut ranked: [Option<&Voice>; 6] = [None; 6];

    for voice in voices {
        let rank = match &voice.lang {
            Some(voice_lang) => {
                let tag = LanguageTag::parse(voice_lang);
                if tag.primary != wanted.primary {
                    continue;
                }
                if tag.rest == wanted.rest {
                    if voice.gender == Some(Gender::Female) {
                        0
                    } else {
                        1
                    }
                } else if tag.rest.is_none() {
                    2
                } else if wanted.is_english_us() && tag.primary == "en" {
                    3
                } else {
                    5
                }
            }
            None => 4,
        };
        ranked[rank].get_or_insert(voice);
    }

    ranked.into_iter().flatten().next()
}

/// Pick a voice by exact name, else by language: local voices first, then the
/// translation service, then everything.
pub fn find_voice(voices: &[Voice], name: Option<&str>, lang: Option<&str>) -> Option<Voice> {
    if let Some(voice) = name.and_then(|n| find_voice_by_name(voices, n)) {
        return Some(voice.clone());
    }
    let lang = lang?;
    let voice = find_voice_by_lang(voices.iter().filter(|v| !v.engine.is_remote()), lang)
        .or_else(|| {
            find_voice_by_lang(
                voices.iter().filter(|v| v.engine == EngineKind::GoogleTranslate),
                lang,
            )
        })
        .or_else(|| find_voice_by_lang(voices, lang))?;

    let mut voice = voice.clone();
    if voice.engine.is_remote() {
        voice.auto_select = true;
    }
    Some(voice)
}

pub fn resolve_voice(
    voices: &[Voice],
    name: Option<&str>,
    lang: &str,
) -> Result<Voice, PlaybackError> {
    find_voice(voices, name, Some(lang)).ok_or_else(|| PlaybackError::NoVoiceFound {
        lang: lang.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, lang: Option<&str>) -> Voice {
        Voice::new(name, lang, EngineKind::Local)
    }

    #[test]
    fn test_female_wins_exact_dialect() {
        let voices = vec![
            local("A", Some("en-GB")).with_gender(Gender::Male),
            local("B", Some("en-GB")).with_gender(Gender::Female),
        ];
        assert_eq!(find_voice_by_lang(&voices, "en-GB").unwrap().name, "B");
    }

    #[test]
    fn test_dialect_agnostic_voice_matches() {
        let voices = vec![local("French", Some("fr"))];
        assert_eq!(find_voice_by_lang(&voices, "fr-CA").unwrap().name, "French");
    }

    #[test]
    fn test_precedence_order() {
        let voices = vec![
            local("other-dialect", Some("pt-PT")),
            local("universal", None),
            local("no-dialect", Some("pt")),
        ];
        assert_eq!(find_voice_by_lang(&voices, "pt-BR").unwrap().name, "no-dialect");
        assert_eq!(find_voice_by_lang(&voices[..2], "pt-BR").unwrap().name, "universal");
        assert_eq!(find_voice_by_lang(&voices[..1], "pt-BR").unwrap().name, "other-dialect");
    }

    #[test]
    fn test_english_us_prefers_other_english_over_universal() {
        let voices = vec![local("universal", None), local("british", Some("en-GB"))];
        assert_eq!(find_voice_by_lang(&voices, "en_US").unwrap().name, "british");
        assert_eq!(find_voice_by_lang(&voices, "en-AU").unwrap().name, "universal");
    }

    #[test]
    fn test_name_match_ignores_language() {
        let voices = vec![local("Alice", Some("de")), local("Bob", Some("en"))];
        let voice = find_voice(&voices, Some("Alice"), Some("en")).unwrap();
        assert_eq!(voice.name, "Alice");
        assert!(!voice.auto_select);
    }

    #[test]
    fn test_unknown_name_falls_back_to_language() {
        let voices = vec![local("Bob", Some("en"))];
        assert_eq!(find_voice(&voices, Some("Nobody"), Some("en")).unwrap().name, "Bob");
    }

    #[test]
    fn test_local_pass_beats_translation_pass() {
        let voices = vec![
            Voice::new("GoogleTranslate German", Some("de"), EngineKind::GoogleTranslate),
            local("Local German", Some("de-DE")),
        ];
        let voice = find_voice(&voices, None, Some("de-DE")).unwrap();
        assert_eq!(voice.name, "Local German");
        assert!(!voice.auto_select);
    }

    #[test]
    fn test_remote_voice_found_by_language_is_auto_select() {
        let voices = vec![
            Voice::new("ReadAloud Generic Voice", None, EngineKind::Remote),
            Voice::new("GoogleTranslate Dutch", Some("nl"), EngineKind::GoogleTranslate),
        ];
        let voice = find_voice(&voices, None, Some("nl-BE")).unwrap();
        assert_eq!(voice.name, "GoogleTranslate Dutch");
        assert!(voice.auto_select);

        let voice = find_voice(&voices, None, Some("sw")).unwrap();
        assert_eq!(voice.name, "ReadAloud Generic Voice");
    }

    #[test]
    fn test_no_voice_found_reports_language() {
        let voices = vec![local("Bob", Some("en"))];
        assert_eq!(
            resolve_voice(&voices, None, "ja"),
            Err(PlaybackError::NoVoiceFound { lang: "ja".into() })
        );
    }
}
