//! Local speech through OS commands.
//!
//! Uses espeak-ng directly, or speech-dispatcher's `spd-say`, whichever is
//! installed. Text is passed as an argument and the command plays it itself.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EngineEvent, EngineKind, EventSink, SpeakOptions, TtsEngine};
use crate::config::LocalConfig;
use crate::error::PlaybackError;
use crate::voice::{Gender, Voice};

const ESPEAK: &str = "espeak-ng";
const SPD_SAY: &str = "spd-say";
const ESPEAK_BASE_WPM: f32 = 175.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalBackend {
    Espeak,
    SpeechDispatcher,
}

impl LocalBackend {
    fn program(self) -> &'static str {
        match self {
            Self::Espeak => ESPEAK,
            Self::SpeechDispatcher => SPD_SAY,
        }
    }

    /// Resolve the configured backend. `auto` takes the first one installed.
    pub fn from_config(config: &LocalConfig) -> Option<Self> {
        match config.backend.as_str() {
            "none" => None,
            ESPEAK => Some(Self::Espeak),
            SPD_SAY => Some(Self::SpeechDispatcher),
            other => {
                if other != "auto" {
                    warn!("Unknown local backend '{other}', detecting");
                }
                [Self::Espeak, Self::SpeechDispatcher]
                    .into_iter()
                    .find(|b| find_in_path(b.program()).is_some())
            }
        }
    }

    fn speak_args(self, text: &str, options: &SpeakOptions) -> Vec<String> {
        let rate = if options.rate > 0.0 { options.rate } else { 1.0 };
        let volume = options.volume.clamp(0.0, 1.0);
        let lang = options.voice.lang.as_deref().unwrap_or(&options.lang);
        match self {
            Self::Espeak => vec![
                "-v".into(),
                lang.to_string(),
                "-s".into(),
                ((ESPEAK_BASE_WPM * rate).round() as i32).to_string(),
                "-a".into(),
                ((volume * 100.0).round() as i32).to_string(),
                "--".into(),
                text.to_string(),
            ],
            Self::SpeechDispatcher => vec![
                "--wait".into(),
                "-l".into(),
                lang.to_string(),
                "-y".into(),
                options.voice.name.clone(),
                "-r".into(),
                (((rate - 1.0) * 100.0).round().clamp(-100.0, 100.0) as i32).to_string(),
                "-i".into(),
                ((volume * 200.0 - 100.0).round() as i32).to_string(),
                "--".into(),
                text.to_string(),
            ],
        }
    }

    fn list_args(self) -> &'static [&'static str] {
        match self {
            Self::Espeak => &["--voices"],
            Self::SpeechDispatcher => &["-L"],
        }
    }

    fn parse_voices(self, output: &str) -> Vec<Voice> {
        match self {
            Self::Espeak => parse_espeak_voices(output),
            Self::SpeechDispatcher => parse_spd_voices(output),
        }
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Parse `espeak-ng --voices`:
/// `Pty Language Age/Gender VoiceName File Other Languages`
pub fn parse_espeak_voices(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _priority = cols.next()?;
            let lang = cols.next()?;
            let age_gender = cols.next()?;
            let name = cols.next()?.replace('_', " ");
            let voice = Voice::new(format!("eSpeak {name}"), Some(lang), EngineKind::Local);
            Some(match age_gender.rsplit('/').next() {
                Some("F") => voice.with_gender(Gender::Female),
                Some("M") => voice.with_gender(Gender::Male),
                _ => voice,
            })
        })
        .collect()
}

/// Parse `spd-say -L`: `NAME LANGUAGE VARIANT`, where names may contain spaces.
pub fn parse_spd_voices(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 3 || cols[0] == "NAME" {
                return None;
            }
            let lang = cols[cols.len() - 2];
            let name = cols[..cols.len() - 2].join(" ");
            Some(Voice::new(name, Some(lang), EngineKind::Local))
        })
        .collect()
}

pub struct LocalTtsEngine {
    backend: Option<LocalBackend>,
    enumeration_timeout: Duration,
    speaking: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl LocalTtsEngine {
    pub fn new(config: &LocalConfig, enumeration_timeout: Duration) -> Self {
        let backend = LocalBackend::from_config(config);
        match backend {
            Some(b) => info!("Local TTS backend: {}", b.program()),
            None => info!("No local TTS backend available"),
        }
        Self::with_backend(backend, enumeration_timeout)
    }

    pub fn with_backend(backend: Option<LocalBackend>, enumeration_timeout: Duration) -> Self {
        Self {
            backend,
            enumeration_timeout,
            speaking: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    async fn run(
        &self,
        backend: LocalBackend,
        text: &str,
        options: &SpeakOptions,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<bool, PlaybackError> {
        let mut child = Command::new(backend.program())
            .args(backend.speak_args(text, options))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Engine(format!("Failed to spawn {}: {e}", backend.program())))?;

        self.speaking.store(true, Ordering::Relaxed);
        let _ = events.send(EngineEvent::Start);

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Ok(false)
            }
            status = child.wait() => {
                let status = status
                    .map_err(|e| PlaybackError::Engine(format!("{} failed: {e}", backend.program())))?;
                if status.success() {
                    Ok(true)
                } else {
                    Err(PlaybackError::Engine(format!(
                        "{} exited with {status}",
                        backend.program()
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl TtsEngine for LocalTtsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    async fn speak(&self, text: &str, options: &SpeakOptions, events: EventSink) {
        let Some(backend) = self.backend else {
            let _ = events.send(EngineEvent::Error(PlaybackError::Engine(
                "No local speech engine installed".into(),
            )));
            return;
        };

        let cancel = self.cancel.lock().unwrap().clone();
        let result = self.run(backend, text, options, &cancel, &events).await;
        self.speaking.store(false, Ordering::Relaxed);

        match result {
            Ok(true) => {
                let _ = events.send(EngineEvent::End);
            }
            Ok(false) => debug!("Local utterance cancelled"),
            Err(e) => {
                warn!("Local TTS failed: {e}");
                let _ = events.send(EngineEvent::Error(e));
            }
        }
    }

    async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock().unwrap(), CancellationToken::new());
        previous.cancel();
        self.speaking.store(false, Ordering::Relaxed);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    async fn voices(&self) -> Vec<Voice> {
        let Some(backend) = self.backend else {
            return Vec::new();
        };
        let output = Command::new(backend.program())
            .args(backend.list_args())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.enumeration_timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                let voices = backend.parse_voices(&String::from_utf8_lossy(&out.stdout));
                debug!("{} local voices", voices.len());
                voices
            }
            Ok(Ok(out)) => {
                warn!("{} voice listing exited with {}", backend.program(), out.status);
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("Failed to list {} voices: {e}", backend.program());
                Vec::new()
            }
            Err(_) => {
                warn!("Timed out listing {} voices", backend.program());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(rate: f32, volume: f32) -> SpeakOptions {
        SpeakOptions {
            voice: Voice::new("English (America)", Some("en-us"), EngineKind::Local),
            lang: "en-US".into(),
            rate,
            volume,
        }
    }

    #[test]
    fn test_parse_espeak_voices() {
        let output = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
5  af              --/M      Afrikaans          gmw/af\n \
5  en-gb           --/F      English_(Great_Britain) gmw/en           (en 2)\n";
        let voices = parse_espeak_voices(output);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].name, "eSpeak English (Great Britain)");
        assert_eq!(voices[1].lang.as_deref(), Some("en-gb"));
        assert_eq!(voices[1].gender, Some(Gender::Female));
        assert_eq!(voices[0].gender, Some(Gender::Male));
    }

    #[test]
    fn test_parse_spd_voices() {
        let output = "     NAME                 LANGUAGE   VARIANT\n     \
Afrikaans            af         none\n     \
English (Great Britain) en-gb     none\n";
        let voices = parse_spd_voices(output);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].name, "English (Great Britain)");
        assert_eq!(voices[1].lang.as_deref(), Some("en-gb"));
    }

    #[test]
    fn test_espeak_args_scale_rate_and_volume() {
        let args = LocalBackend::Espeak.speak_args("Hello", &options(2.0, 0.5));
        assert_eq!(args, vec!["-v", "en-us", "-s", "350", "-a", "50", "--", "Hello"]);
    }

    #[test]
    fn test_spd_args_clamp_rate() {
        let args = LocalBackend::SpeechDispatcher.speak_args("Hi", &options(4.0, 1.0));
        assert_eq!(&args[5..9], &["-r", "100", "-i", "100"]);
        assert_eq!(args[4], "English (America)");
    }

    #[test]
    fn test_none_backend_from_config() {
        let config = LocalConfig {
            backend: "none".into(),
        };
        assert_eq!(LocalBackend::from_config(&config), None);
    }

    #[tokio::test]
    async fn test_no_backend_reports_error() {
        let engine = LocalTtsEngine::with_backend(None, Duration::from_millis(10));
        assert!(engine.voices().await.is_empty());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine.speak("Hello", &options(1.0, 1.0), tx).await;
        assert!(matches!(rx.recv().await, Some(EngineEvent::Error(_))));
        assert!(!engine.is_speaking());
    }
}
