//! Playback error taxonomy.
//!
//! Errors are `Clone` so the supervisor can keep the last terminal error
//! around for `/status` and so they can travel through player channels.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("No text found")]
    NoTextFound,

    #[error("No voice found for language {lang}")]
    NoVoiceFound { lang: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Google Translate permission required")]
    AuthRequired,

    #[error("User gesture required to start audio")]
    UserGestureRequired,

    #[error("TTS engine protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("{0}")]
    Engine(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Can't forward, at end")]
    CantForward,

    #[error("Can't rewind, at beginning")]
    CantRewind,

    #[error("Nothing is playing")]
    NotPlaying,

    #[error("Playback interrupted")]
    Interrupted,

    #[error("Login failed: {0}")]
    Login(String),
}

impl PlaybackError {
    /// UI error code for errors the UI knows how to present.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NoTextFound => Some("error_no_text"),
            Self::NoVoiceFound { .. } => Some("error_no_voice"),
            Self::AuthRequired => Some("error_gtranslate_auth_required"),
            Self::UserGestureRequired => Some("error_user_gesture_required"),
            _ => None,
        }
    }

    /// Coded errors are terminal; everything else from a backend probe may be
    /// worked around by switching engines.
    pub fn is_recoverable(&self) -> bool {
        self.code().is_none()
    }

    /// JSON-encoded payload surfaced to the UI layer.
    pub fn payload(&self) -> String {
        let value = match (self, self.code()) {
            (Self::NoVoiceFound { lang }, Some(code)) => json!({ "code": code, "lang": lang }),
            (_, Some(code)) => json!({ "code": code }),
            (_, None) => json!({ "message": self.to_string() }),
        };
        value.to_string()
    }
}

impl From<reqwest::Error> for PlaybackError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::BackendUnavailable(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PlaybackError {
    fn from(e: serde_json::Error) -> Self {
        Self::Engine(format!("Invalid JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_voice_payload_carries_lang() {
        let err = PlaybackError::NoVoiceFound { lang: "fr-CA".into() };
        let value: serde_json::Value = serde_json::from_str(&err.payload()).unwrap();
        assert_eq!(value["code"], "error_no_voice");
        assert_eq!(value["lang"], "fr-CA");
    }

    #[test]
    fn test_uncoded_errors_are_recoverable() {
        assert!(PlaybackError::BackendUnavailable("down".into()).is_recoverable());
        assert!(!PlaybackError::AuthRequired.is_recoverable());
        let value: serde_json::Value =
            serde_json::from_str(&PlaybackError::CantForward.payload()).unwrap();
        assert_eq!(value["message"], "Can't forward, at end");
    }
}
