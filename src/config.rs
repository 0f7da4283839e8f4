//! Configuration management for read-aloud-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a partial file only needs the keys it changes.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8768 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub url: String,
    pub web_app_url: String,
    /// Disables prefetching and scheduled start on hosts that can't keep up.
    pub constrained_platform: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://support.readaloud.app".into(),
            web_app_url: "https://readaloud.app".into(),
            constrained_platform: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleTranslateConfig {
    pub enabled: bool,
    pub tld: String,
    pub tokens_ttl_secs: u64,
    pub unsupported_voice_suffixes: Vec<String>,
    pub fallback_voice: String,
}

impl Default for GoogleTranslateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tld: "com".into(),
            tokens_ttl_secs: 3600,
            unsupported_voice_suffixes: vec!["Hebrew".into(), "Telugu".into()],
            fallback_voice: "Microsoft US English (Zira)".into(),
        }
    }
}

impl GoogleTranslateConfig {
    /// Whether a voice name is one this engine can't actually speak.
    pub fn is_unsupported(&self, voice_name: &str) -> bool {
        self.unsupported_voice_suffixes
            .iter()
            .any(|suffix| voice_name.ends_with(&format!(" {suffix}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// `auto`, `espeak-ng`, `spd-say` or `none`.
    pub backend: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub translate_char_limit: usize,
    pub char_limit: usize,
    pub paragraph_combine_threshold: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            translate_char_limit: 200,
            char_limit: 750,
            paragraph_combine_threshold: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_lang: String,
    pub rewind_restart_window_ms: u64,
    pub debounce_ms: u64,
    /// Silence held between consecutive chunks by engines that can schedule.
    pub chunk_gap_ms: u64,
    pub voice_enumeration_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_lang: "en-US".into(),
            rewind_restart_window_ms: 3000,
            debounce_ms: 750,
            chunk_gap_ms: 0,
            voice_enumeration_timeout_ms: 1500,
        }
    }
}

impl PlaybackConfig {
    pub fn rewind_restart_window(&self) -> Duration {
        Duration::from_millis(self.rewind_restart_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn chunk_gap(&self) -> Duration {
        Duration::from_millis(self.chunk_gap_ms)
    }

    pub fn voice_enumeration_timeout(&self) -> Duration {
        Duration::from_millis(self.voice_enumeration_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub service: ServiceConfig,
    pub google_translate: GoogleTranslateConfig,
    pub local: LocalConfig,
    pub segmenter: SegmenterConfig,
    pub playback: PlaybackConfig,
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/read-aloud/config.yaml
    /// 3. /etc/read-aloud/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/read-aloud/config.yaml")),
                Some(PathBuf::from("/etc/read-aloud/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    /// Where persisted settings live: `settings_path`, else the user cache dir.
    pub fn settings_file(&self) -> PathBuf {
        self.settings_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("read-aloud/settings.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "api:\n  port: 9000\nplayback:\n  debounce_ms: 10\n";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.playback.debounce(), Duration::from_millis(10));
        assert_eq!(config.playback.rewind_restart_window(), Duration::from_secs(3));
        assert_eq!(config.segmenter.char_limit, 750);
        assert_eq!(config.google_translate.tld, "com");
    }

    #[test]
    fn test_unsupported_voice_suffix() {
        let gt = GoogleTranslateConfig::default();
        assert!(gt.is_unsupported("GoogleTranslate Hebrew"));
        assert!(gt.is_unsupported("GoogleTranslate Telugu"));
        assert!(!gt.is_unsupported("GoogleTranslate German"));
        assert!(!gt.is_unsupported("Hebrew"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/read-aloud.yaml")));
        assert_eq!(config.api.port, 8768);
        assert_eq!(config.local.backend, "auto");
    }

    #[test]
    fn test_settings_file_override() {
        let config = Config {
            settings_path: Some(PathBuf::from("/tmp/s.json")),
            ..Config::default()
        };
        assert_eq!(config.settings_file(), PathBuf::from("/tmp/s.json"));
    }
}
