//! Builds a `Speech` for a batch of texts: resolves the voice and playback
//! options from settings, picks the engine and segments the text.

use std::sync::Arc;

use tracing::{info, warn};

use super::{PlayerContext, Speech};
use crate::config::{Config, GoogleTranslateConfig, SegmenterConfig};
use crate::engine::{EngineKind, Engines, SpeakOptions, TtsEngine};
use crate::error::PlaybackError;
use crate::lang::{speech_lang, LanguageTag};
use crate::settings::{scale_legacy_speed, Settings};
use crate::text::{self, preprocess::ensure_terminal_punctuation, PunctuationStyle};
use crate::voice::resolve_voice;

const DEFAULT_RATE: f32 = 1.0;
const DEFAULT_VOLUME: f32 = 1.0;

pub struct SpeechFactory {
    engines: Engines,
    settings: Arc<Settings>,
    google: GoogleTranslateConfig,
    segmenter: SegmenterConfig,
    default_lang: String,
}

impl SpeechFactory {
    pub fn new(engines: Engines, settings: Arc<Settings>, config: &Config) -> Self {
        Self {
            engines,
            settings,
            google: config.google_translate.clone(),
            segmenter: config.segmenter.clone(),
            default_lang: config.playback.default_lang.clone(),
        }
    }

    /// Voice, language, rate and volume for the next speech.
    pub async fn speak_options(&self, lang: Option<&str>) -> Result<SpeakOptions, PlaybackError> {
        let prefs = self.settings.speech_preferences().await;
        let voice_name = match self.settings.voice_name().await {
            Some(name) => Some(name),
            None => prefs.as_ref().and_then(|p| p.speech_voice.clone()),
        };

        let (rate, volume) = match &prefs {
            Some(p) => {
                let rate = scale_legacy_speed(p.speech_speed);
                let rate = if rate > 0.0 { rate } else { DEFAULT_RATE };
                (rate, p.speech_volume)
            }
            None => (
                self.settings.rate().await.unwrap_or(DEFAULT_RATE),
                self.settings.volume().await.unwrap_or(DEFAULT_VOLUME),
            ),
        };

        let lang = speech_lang(lang, &self.default_lang);
        let voices = self.engines.voices().await;
        let voice = resolve_voice(&voices, voice_name.as_deref(), &lang)?;
        info!("Voice: {} ({}) for {lang}", voice.name, voice.engine);

        Ok(SpeakOptions {
            voice,
            lang,
            rate,
            volume: volume.clamp(0.0, 1.0),
        })
    }

    /// Choose the engine for `options`, possibly rewriting the voice when the
    /// translation service is unavailable.
    pub async fn pick_engine(
        &self,
        options: &mut SpeakOptions,
    ) -> Result<Arc<dyn TtsEngine>, PlaybackError> {
        if options.voice.engine == EngineKind::GoogleTranslate
            && !self.google.is_unsupported(&options.voice.name)
        {
            return match self.engines.google.ready().await {
                Ok(()) => Ok(self.engines.google.clone()),
                Err(e) if !e.is_recoverable() => Err(e),
                Err(e) => {
                    warn!("GoogleTranslate unavailable, {e}");
                    options.voice.auto_select = true;
                    options.voice.name = self.google.fallback_voice.clone();
                    options.voice.engine = EngineKind::Remote;
                    Ok(self.engines.remote.clone())
                }
            };
        }
        Ok(self.engines.get(if options.voice.engine.is_remote() {
            EngineKind::Remote
        } else {
            EngineKind::Local
        }))
    }

    /// Segment joined texts with the budget of the chosen engine.
    pub fn chunk(&self, texts: &[String], lang: &str, engine: EngineKind) -> Vec<String> {
        let joined = texts
            .iter()
            .map(|t| ensure_terminal_punctuation(t))
            .collect::<Vec<_>>()
            .join("\n\n");
        let style = PunctuationStyle::for_language(&LanguageTag::parse(lang));
        if engine == EngineKind::GoogleTranslate {
            text::segment(&joined, self.segmenter.translate_char_limit, None, style)
        } else {
            text::segment(
                &joined,
                self.segmenter.char_limit,
                Some(self.segmenter.paragraph_combine_threshold),
                style,
            )
        }
    }

    pub async fn create(
        &self,
        texts: &[String],
        lang: Option<&str>,
        ctx: PlayerContext,
    ) -> Result<Speech, PlaybackError> {
        let mut options = self.speak_options(lang).await?;
        let engine = self.pick_engine(&mut options).await?;
        let chunks = self.chunk(texts, &options.lang, engine.kind());
        let is_rtl = LanguageTag::parse(&options.lang).is_rtl();
        info!("Speech ready: {} chunks via {} engine", chunks.len(), engine.kind());
        Ok(Speech::new(engine, options, chunks, is_rtl, ctx))
    }
}
