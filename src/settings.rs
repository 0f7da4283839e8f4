//! Persisted key/value settings.
//!
//! A single JSON object on disk, read once at startup and written through on
//! every change. Keys match the ones the browser extension stores so an
//! exported settings file can be dropped in as is.

use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const VOICE_NAME: &str = "voiceName";
const RATE: &str = "rate";
const VOLUME: &str = "volume";
const AUTH_TOKEN: &str = "authToken";
const CLIENT_ID: &str = "uniqueClientId";
const WIZ: &str = "wiz";
const SPEECH_SETTINGS: &str = "speechSettings";
const LAST_URL: &str = "lastUrl";

/// Session tokens scraped from the translation page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WizTokens {
    #[serde(rename = "f.sid")]
    pub f_sid: Option<String>,
    pub bl: Option<String>,
    pub at: Option<String>,
    /// Unix millis when scraped.
    pub timestamp: i64,
}

/// Speech preferences from the older settings layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechPreferences {
    pub speech_speed: f32,
    pub speech_volume: f32,
    pub speech_voice: Option<String>,
}

impl Default for SpeechPreferences {
    fn default() -> Self {
        Self {
            speech_speed: 1.6,
            speech_volume: 1.0,
            speech_voice: None,
        }
    }
}

/// Map a legacy speech speed (1.5..3.0 scale) onto a playback rate
/// (1.3..2.5 scale), rounded to one decimal.
pub fn scale_legacy_speed(speed: f32) -> f32 {
    let scaled = (speed - 1.5) / (3.0 - 1.5) * (2.5 - 1.3) + 1.3;
    (scaled * 10.0).round() / 10.0
}

pub struct Settings {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl Settings {
    /// Load from `path`. A missing or corrupt file starts empty.
    pub fn load(path: &Path) -> Self {
        let values = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(map) => {
                    info!("Loaded {} settings from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}, starting empty", path.display());
                    Map::new()
                }
            },
            Err(_) => {
                debug!("No settings file at {}", path.display());
                Map::new()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            values: Mutex::new(values),
        }
    }

    /// Settings that are never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock().await;
        let value = values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring malformed setting {key}: {e}");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize setting {key}: {e}");
                return;
            }
        };
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.persist(&values);
    }

    pub async fn remove(&self, key: &str) {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.persist(&values);
        }
    }

    fn persist(&self, values: &Map<String, Value>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create settings dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(values) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write settings: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize settings: {e}"),
        }
    }

    pub async fn voice_name(&self) -> Option<String> {
        self.get(VOICE_NAME).await
    }

    pub async fn rate(&self) -> Option<f32> {
        self.get(RATE).await
    }

    pub async fn volume(&self) -> Option<f32> {
        self.get(VOLUME).await
    }

    pub async fn auth_token(&self) -> Option<String> {
        self.get(AUTH_TOKEN).await
    }

    pub async fn save_auth_token(&self, token: &str) {
        self.set(AUTH_TOKEN, &token).await;
    }

    pub async fn clear_auth_token(&self) {
        self.remove(AUTH_TOKEN).await;
    }

    /// Per-install client id, created on first use.
    pub async fn unique_client_id(&self) -> String {
        let mut values = self.values.lock().await;
        if let Some(Value::String(id)) = values.get(CLIENT_ID) {
            return id.clone();
        }
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        values.insert(CLIENT_ID.to_string(), Value::String(id.clone()));
        self.persist(&values);
        id
    }

    pub async fn wiz(&self) -> Option<WizTokens> {
        self.get(WIZ).await
    }

    pub async fn save_wiz(&self, tokens: &WizTokens) {
        self.set(WIZ, tokens).await;
    }

    pub async fn speech_preferences(&self) -> Option<SpeechPreferences> {
        self.get(SPEECH_SETTINGS).await
    }

    pub async fn save_speech_preferences(&self, prefs: &SpeechPreferences) {
        self.set(SPEECH_SETTINGS, prefs).await;
    }

    pub async fn last_url(&self) -> Option<String> {
        self.get(LAST_URL).await
    }

    pub async fn save_last_url(&self, url: &str) {
        self.set(LAST_URL, &url).await;
    }
}
