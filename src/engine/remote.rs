//! Remote HTTP speech service engine.
//!
//! Audio is requested from `<service>/read-aloud/speak/<lang>/<voice>` with the
//! client id and auth token, fully downloaded, then played. The next chunk can
//! be prefetched so the service has it cached by the time it is requested.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::{AudioOutput, PlayOutcome};
use super::{EngineEvent, EngineKind, EventSink, SpeakOptions, TtsEngine};
use crate::config::ServiceConfig;
use crate::error::PlaybackError;
use crate::settings::Settings;
use crate::voice::Voice;

/// Characters `encodeURIComponent` leaves alone.
pub const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const GENERIC_VOICE: &str = "ReadAloud Generic Voice";

pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

/// Credentials sent with every audio request.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub client_id: String,
    pub auth_token: Option<String>,
}

pub struct RemoteTtsEngine {
    service_url: String,
    version: String,
    // Some platforms can't prefetch or hold playback for a start time.
    constrained: bool,
    client: Client,
    settings: Arc<Settings>,
    audio: AudioOutput,
    next_start: Mutex<Option<Instant>>,
    cancel: Mutex<CancellationToken>,
}

impl RemoteTtsEngine {
    pub fn new(config: &ServiceConfig, settings: Arc<Settings>) -> Result<Self, PlaybackError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            service_url: config.url.trim_end_matches('/').to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            constrained: config.constrained_platform,
            client,
            settings,
            audio: AudioOutput::new(),
            next_start: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    async fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.settings.unique_client_id().await,
            auth_token: self.settings.auth_token().await,
        }
    }

    pub fn audio_url(
        &self,
        text: &str,
        lang: &str,
        voice: &Voice,
        credentials: &Credentials,
        prefetch: bool,
    ) -> String {
        build_audio_url(
            &self.service_url,
            &self.version,
            text,
            lang,
            voice,
            credentials,
            prefetch,
        )
    }

    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>, PlaybackError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(PlaybackError::Http(format!("Server returns {}", resp.status())));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn speak_inner(
        &self,
        text: &str,
        options: &SpeakOptions,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<PlayOutcome, PlaybackError> {
        let credentials = self.credentials().await;
        let url = self.audio_url(text, &options.lang, &options.voice, &credentials, false);

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Ok(PlayOutcome::Cancelled),
            bytes = self.fetch_audio(&url) => bytes?,
        };

        let start_at = *self.next_start.lock().unwrap();
        if let Some(wait) = start_at.and_then(|at| at.checked_duration_since(Instant::now())) {
            debug!("Holding utterance for {}ms", wait.as_millis());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PlayOutcome::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let volume = options.volume.clamp(0.0, 1.0);
        let rate = if options.rate > 0.0 { options.rate } else { 1.0 };
        let (speed, volume) = if self.constrained { (1.0, 1.0) } else { (rate, volume) };
        self.audio
            .play(bytes, volume, speed, cancel, || {
                let _ = events.send(EngineEvent::Start);
            })
            .await
    }
}

pub fn build_audio_url(
    service_url: &str,
    version: &str,
    text: &str,
    lang: &str,
    voice: &Voice,
    credentials: &Credentials,
    prefetch: bool,
) -> String {
    let mut url = format!(
        "{service_url}/read-aloud/speak/{lang}/{}?c={}&t={}&v={}&pf={}&q={}",
        encode_component(&voice.name),
        encode_component(&credentials.client_id),
        encode_component(credentials.auth_token.as_deref().unwrap_or_default()),
        encode_component(version),
        u8::from(prefetch),
        encode_component(text),
    );
    if voice.auto_select {
        url.push_str("&a=1");
    }
    url
}

#[async_trait]
impl TtsEngine for RemoteTtsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Remote
    }

    async fn speak(&self, text: &str, options: &SpeakOptions, events: EventSink) {
        let cancel = self.cancel.lock().unwrap().clone();
        let result = self.speak_inner(text, options, &cancel, &events).await;

        match result {
            Ok(PlayOutcome::Finished) => {
                let _ = events.send(EngineEvent::End);
            }
            Ok(PlayOutcome::Cancelled) => debug!("Remote utterance cancelled"),
            Err(e) => {
                warn!("Remote TTS failed: {e}");
                let _ = events.send(EngineEvent::Error(e));
            }
        }
    }

    async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock().unwrap(), CancellationToken::new());
        previous.cancel();
        self.audio.stop();
    }

    fn is_speaking(&self) -> bool {
        self.audio.is_speaking()
    }

    async fn voices(&self) -> Vec<Voice> {
        let mut generic = Voice::new(GENERIC_VOICE, None, EngineKind::Remote);
        generic.auto_select = true;
        vec![generic]
    }

    async fn prefetch(&self, text: &str, options: &SpeakOptions) {
        if self.constrained {
            return;
        }
        let credentials = self.credentials().await;
        let url = self.audio_url(text, &options.lang, &options.voice, &credentials, true);
        match self.fetch_audio(&url).await {
            Ok(bytes) => debug!("Prefetched {} bytes", bytes.len()),
            Err(e) => warn!("Prefetch failed: {e}"),
        }
    }

    fn set_next_start_time(&self, at: Option<Instant>) {
        if self.constrained {
            return;
        }
        *self.next_start.lock().unwrap() = at;
        if let Some(at) = at {
            info!(
                "Next utterance scheduled in {}ms",
                at.saturating_duration_since(Instant::now()).as_millis()
            );
        }
    }
}
