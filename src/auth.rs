//! Interactive login against the read-aloud web app.
//!
//! The user opens the login URL in a browser; the web app redirects back to
//! `/auth/callback` with either `token` or `error`/`error_description` in the
//! query string.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::engine::remote::encode_component;
use crate::error::PlaybackError;
use crate::settings::Settings;

pub fn login_url(web_app_url: &str, callback: &str) -> String {
    format!(
        "{}/login.html?returnUrl={}",
        web_app_url.trim_end_matches('/'),
        encode_component(callback)
    )
}

/// The bearer token from callback parameters, or the reason login failed.
pub fn callback_token(params: &HashMap<String, String>) -> Result<String, PlaybackError> {
    if let Some(token) = params.get("token").filter(|t| !t.is_empty()) {
        return Ok(token.clone());
    }
    let reason = params
        .get("error_description")
        .or_else(|| params.get("error"))
        .cloned()
        .unwrap_or_else(|| "no token in callback".into());
    Err(PlaybackError::Login(reason))
}

/// Store the token carried by the callback parameters.
pub async fn complete_login(
    settings: &Settings,
    params: &HashMap<String, String>,
) -> Result<(), PlaybackError> {
    match callback_token(params) {
        Ok(token) => {
            settings.save_auth_token(&token).await;
            info!("Signed in to the speech service");
            Ok(())
        }
        Err(e) => {
            warn!("{e}");
            Err(e)
        }
    }
}

pub async fn logout(settings: &Settings) {
    settings.clear_auth_token().await;
    info!("Signed out of the speech service");
}
