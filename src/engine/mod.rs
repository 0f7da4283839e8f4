//! Text-to-speech engines.
//!
//! - `local`: OS speech commands (espeak-ng, speech-dispatcher)
//! - `remote`: the read-aloud HTTP speech service
//! - `google`: Google Translate's speech endpoint
//! - `audio`: shared rodio playback for engines that download audio

pub mod audio;
pub mod google;
pub mod local;
pub mod remote;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PlaybackError;
use crate::voice::Voice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineKind {
    Local,
    Remote,
    GoogleTranslate,
}

impl EngineKind {
    /// Voices synthesized off-machine.
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::GoogleTranslate => write!(f, "google-translate"),
        }
    }
}

/// Events an engine reports for one `speak` call: one `Start`, then one of
/// `End` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Start,
    End,
    Error(PlaybackError),
}

pub type EventSink = mpsc::UnboundedSender<EngineEvent>;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOptions {
    pub voice: Voice,
    pub lang: String,
    pub rate: f32,
    pub volume: f32,
}

#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Check the engine can be used right now.
    async fn ready(&self) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Speak `text`, reporting progress on `events`. Returns once the
    /// utterance is over or `stop` was called.
    async fn speak(&self, text: &str, options: &SpeakOptions, events: EventSink);

    /// Abort the utterance in flight. No `End` is reported for it.
    async fn stop(&self);

    fn is_speaking(&self) -> bool;

    async fn voices(&self) -> Vec<Voice>;

    /// Warm up whatever `speak(text, options)` will need next.
    async fn prefetch(&self, _text: &str, _options: &SpeakOptions) {}

    /// Hold the next utterance until `at` for gapless scheduling.
    fn set_next_start_time(&self, _at: Option<Instant>) {}
}

/// The engine set voices are resolved across.
#[derive(Clone)]
pub struct Engines {
    pub local: Arc<dyn TtsEngine>,
    pub remote: Arc<dyn TtsEngine>,
    pub google: Arc<dyn TtsEngine>,
}

impl Engines {
    pub fn get(&self, kind: EngineKind) -> Arc<dyn TtsEngine> {
        match kind {
            EngineKind::Local => self.local.clone(),
            EngineKind::Remote => self.remote.clone(),
            EngineKind::GoogleTranslate => self.google.clone(),
        }
    }

    /// Every voice, local engine first.
    pub async fn voices(&self) -> Vec<Voice> {
        let (local, google, remote) =
            tokio::join!(self.local.voices(), self.google.voices(), self.remote.voices());
        local.into_iter().chain(google).chain(remote).collect()
    }
}
