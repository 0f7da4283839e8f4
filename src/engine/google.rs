//! Google Translate speech engine.
//!
//! Synthesis goes through the translate web UI's `batchexecute` RPC. The RPC
//! needs session tokens that are scraped from the `WIZ_global_data` script
//! block on the translate page, cached in settings for `tokens_ttl_secs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::{AudioOutput, PlayOutcome};
use super::{EngineEvent, EngineKind, EventSink, SpeakOptions, TtsEngine};
use crate::config::GoogleTranslateConfig;
use crate::error::PlaybackError;
use crate::settings::{Settings, WizTokens};
use crate::voice::Voice;

const SYNTHESIZE_RPC: &str = "jQ1olc";
const WIZ_START: &str = "WIZ_global_data = {";

static F_SID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""FdrFJe":"(.*?)""#).unwrap());
static BL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""cfb2h":"(.*?)""#).unwrap());
static AT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""SNlM0e":"(.*?)""#).unwrap());
static LENGTH_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

const LANGUAGES: &[(&str, &str)] = &[
    ("Afrikaans", "af"),
    ("Albanian", "sq"),
    ("Arabic", "ar"),
    ("Armenian", "hy"),
    ("Bengali", "bn"),
    ("Bosnian", "bs"),
    ("Bulgarian", "bg"),
    ("Catalan", "ca"),
    ("Chinese", "zh-CN"),
    ("Croatian", "hr"),
    ("Czech", "cs"),
    ("Danish", "da"),
    ("Dutch", "nl"),
    ("English", "en"),
    ("Esperanto", "eo"),
    ("Estonian", "et"),
    ("Filipino", "fil"),
    ("Finnish", "fi"),
    ("French", "fr"),
    ("German", "de"),
    ("Greek", "el"),
    ("Gujarati", "gu"),
    ("Hebrew", "he"),
    ("Hindi", "hi"),
    ("Hungarian", "hu"),
    ("Icelandic", "is"),
    ("Indonesian", "id"),
    ("Italian", "it"),
    ("Japanese", "ja"),
    ("Javanese", "jw"),
    ("Kannada", "kn"),
    ("Khmer", "km"),
    ("Korean", "ko"),
    ("Latin", "la"),
    ("Latvian", "lv"),
    ("Macedonian", "mk"),
    ("Malay", "ms"),
    ("Malayalam", "ml"),
    ("Marathi", "mr"),
    ("Myanmar (Burmese)", "my"),
    ("Nepali", "ne"),
    ("Norwegian", "no"),
    ("Polish", "pl"),
    ("Portuguese", "pt"),
    ("Romanian", "ro"),
    ("Russian", "ru"),
    ("Serbian", "sr"),
    ("Sinhala", "si"),
    ("Slovak", "sk"),
    ("Spanish", "es"),
    ("Sundanese", "su"),
    ("Swahili", "sw"),
    ("Swedish", "sv"),
    ("Tagalog", "tl"),
    ("Tamil", "ta"),
    ("Telugu", "te"),
    ("Thai", "th"),
    ("Turkish", "tr"),
    ("Ukrainian", "uk"),
    ("Urdu", "ur"),
    ("Vietnamese", "vi"),
    ("Welsh", "cy"),
];

/// The fixed voice catalog, one voice per supported language.
pub fn catalog() -> Vec<Voice> {
    LANGUAGES
        .iter()
        .map(|(name, lang)| {
            Voice::new(
                format!("GoogleTranslate {name}"),
                Some(*lang),
                EngineKind::GoogleTranslate,
            )
        })
        .collect()
}

/// Pull the session tokens out of the translate page.
pub fn scrape_wiz(page: &str) -> Result<WizTokens, PlaybackError> {
    let start = page
        .find(WIZ_START)
        .ok_or_else(|| PlaybackError::Engine("Wiz not found".into()))?;
    let block = &page[start..];
    let block = match block.find("</script>") {
        Some(end) => &block[..end],
        None => block,
    };

    let find = |name: &str, re: &Regex| {
        let value = re.captures(block).map(|c| c[1].to_string());
        if value.is_none() {
            warn!("Wiz property not found '{name}'");
        }
        value
    };

    Ok(WizTokens {
        f_sid: find("f.sid", &F_SID),
        bl: find("bl", &BL),
        at: find("at", &AT),
        timestamp: 0,
    })
}

/// Unwrap a `batchexecute` response down to the RPC's own payload.
///
/// The body is `)]}'` followed by length-prefixed JSON envelopes; the payload
/// is a JSON string at `[0][2]` of the first envelope. `None` when the RPC
/// returned no payload.
pub fn parse_batch_response(body: &str) -> Result<Option<Value>, PlaybackError> {
    let len_match = LENGTH_PREFIX
        .find(body)
        .ok_or_else(|| PlaybackError::Engine("Malformed batchexecute response".into()))?;
    let len: usize = len_match
        .as_str()
        .parse()
        .map_err(|_| PlaybackError::Engine("Bad envelope length".into()))?;
    let envelope: String = body[len_match.end()..].chars().take(len).collect();

    let envelopes: Value = serde_json::from_str(&envelope)?;
    match envelopes.get(0).and_then(|e| e.get(2)) {
        Some(Value::String(payload)) => Ok(Some(serde_json::from_str(payload)?)),
        _ => Ok(None),
    }
}

/// Query and form parameters for one `batchexecute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub query: Vec<(&'static str, String)>,
    pub form: Vec<(&'static str, String)>,
}

pub fn batch_request(wiz: &WizTokens, rpc_id: &str, payload: &Value, req_id: u64) -> BatchRequest {
    let f_req = serde_json::json!([[[rpc_id, payload.to_string(), null, "generic"]]]);
    let query = vec![
        ("rpcids", rpc_id.to_string()),
        ("f.sid", wiz.f_sid.clone().unwrap_or_default()),
        ("bl", wiz.bl.clone().unwrap_or_default()),
        ("hl", "en".to_string()),
        ("soc-app", "1".to_string()),
        ("soc-platform", "1".to_string()),
        ("soc-device", "1".to_string()),
        ("_reqid", req_id.to_string()),
        ("rt", "c".to_string()),
    ];
    let mut form = vec![("f.req", f_req.to_string())];
    if let Some(at) = wiz.at.as_ref().filter(|at| !at.is_empty()) {
        form.push(("at", at.clone()));
    }
    BatchRequest { query, form }
}

struct Prefetched {
    text: String,
    lang: String,
    audio: Vec<u8>,
}

pub struct GoogleTranslateTtsEngine {
    config: GoogleTranslateConfig,
    client: Client,
    settings: Arc<Settings>,
    audio: AudioOutput,
    batch_number: AtomicU64,
    prefetched: Mutex<Option<Prefetched>>,
    cancel: Mutex<CancellationToken>,
}

impl GoogleTranslateTtsEngine {
    pub fn new(config: GoogleTranslateConfig, settings: Arc<Settings>) -> Result<Self, PlaybackError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            config,
            client,
            settings,
            audio: AudioOutput::new(),
            batch_number: AtomicU64::new(0),
            prefetched: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    fn base_url(&self) -> String {
        format!("https://translate.google.{}", self.config.tld)
    }

    /// Cached tokens if still fresh, otherwise scrape new ones.
    async fn wiz(&self) -> Result<WizTokens, PlaybackError> {
        let now = chrono::Utc::now().timestamp_millis();
        let ttl_ms = (self.config.tokens_ttl_secs * 1000) as i64;
        if let Some(wiz) = self.settings.wiz().await {
            if wiz.timestamp + ttl_ms > now {
                return Ok(wiz);
            }
        }

        debug!("Fetching translate session tokens");
        let page = self
            .client
            .get(self.base_url())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let mut wiz = scrape_wiz(&page)?;
        wiz.timestamp = now;
        self.settings.save_wiz(&wiz).await;
        Ok(wiz)
    }

    fn next_req_id(&self) -> u64 {
        let batch = self.batch_number.fetch_add(1, Ordering::Relaxed) + 1;
        batch * 100_000 + rand::thread_rng().gen_range(1000..10000)
    }

    async fn batch_execute(&self, rpc_id: &str, payload: Value) -> Result<Option<Value>, PlaybackError> {
        let wiz = self.wiz().await?;
        let request = batch_request(&wiz, rpc_id, &payload, self.next_req_id());
        let body = self
            .client
            .post(format!("{}/_/TranslateWebserverUi/data/batchexecute", self.base_url()))
            .query(&request.query)
            .form(&request.form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_batch_response(&body)
    }

    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, PlaybackError> {
        let payload = self
            .batch_execute(SYNTHESIZE_RPC, serde_json::json!([text, lang, null]))
            .await?;
        let encoded = payload
            .as_ref()
            .and_then(|p| p.get(0))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let preview: String = text.chars().take(25).collect();
                PlaybackError::Engine(format!(
                    "Failed to synthesize text '{preview}…' in language {lang}"
                ))
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PlaybackError::Engine(format!("Bad audio payload: {e}")))
    }

    fn take_prefetched(&self, text: &str, lang: &str) -> Option<Vec<u8>> {
        let mut slot = self.prefetched.lock().unwrap();
        match slot.take() {
            Some(p) if p.text == text && p.lang == lang => Some(p.audio),
            other => {
                *slot = other;
                None
            }
        }
    }

    async fn speak_inner(
        &self,
        text: &str,
        options: &SpeakOptions,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<PlayOutcome, PlaybackError> {
        let lang = synthesis_lang(options);
        let audio = match self.take_prefetched(text, lang) {
            Some(audio) => {
                debug!("Using prefetched audio");
                audio
            }
            None => tokio::select! {
                _ = cancel.cancelled() => return Ok(PlayOutcome::Cancelled),
                audio = self.synthesize(text, lang) => audio?,
            },
        };

        let volume = if options.volume > 0.0 { options.volume.min(1.0) } else { 1.0 };
        let rate = if options.rate > 0.0 { options.rate } else { 1.0 };
        self.audio
            .play(audio, volume, rate * 1.1, cancel, || {
                let _ = events.send(EngineEvent::Start);
            })
            .await
    }
}

fn synthesis_lang(options: &SpeakOptions) -> &str {
    options.voice.lang.as_deref().unwrap_or(&options.lang)
}

#[async_trait]
impl TtsEngine for GoogleTranslateTtsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::GoogleTranslate
    }

    async fn ready(&self) -> Result<(), PlaybackError> {
        if !self.config.enabled {
            return Err(PlaybackError::AuthRequired);
        }
        self.wiz().await.map(|_| ())
    }

    async fn speak(&self, text: &str, options: &SpeakOptions, events: EventSink) {
        let cancel = self.cancel.lock().unwrap().clone();
        match self.speak_inner(text, options, &cancel, &events).await {
            Ok(PlayOutcome::Finished) => {
                let _ = events.send(EngineEvent::End);
            }
            Ok(PlayOutcome::Cancelled) => debug!("Translate utterance cancelled"),
            Err(e) => {
                warn!("Google Translate TTS failed: {e}");
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
        catalog()
    }

    async fn prefetch(&self, text: &str, options: &SpeakOptions) {
        let lang = synthesis_lang(options);
        match self.synthesize(text, lang).await {
            Ok(audio) => {
                info!("Prefetched {} bytes of translate audio", audio.len());
                *self.prefetched.lock().unwrap() = Some(Prefetched {
                    text: text.to_string(),
                    lang: lang.to_string(),
                    audio,
                });
            }
            Err(e) => warn!("Prefetch failed: {e}"),
        }
    }
}
