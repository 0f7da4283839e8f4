//! HTTP control API.
//!
//! Trigger input (`/read`), playback controls, state queries, voice listing,
//! speech preferences and the login callback. Listens on 127.0.0.1 only.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth;
use crate::engine::Engines;
use crate::error::PlaybackError;
use crate::player::Position;
use crate::settings::{Settings, SpeechPreferences};
use crate::supervisor::{Status, SupervisorHandle};
use crate::voice::Voice;

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: SupervisorHandle,
    pub settings: Arc<Settings>,
    pub engines: Engines,
    pub web_app_url: String,
    pub port: u16,
}

// --- Request/Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadRequest {
    selection_text: String,
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Deserialize)]
struct SeekRequest {
    index: usize,
}

#[derive(Serialize)]
struct LoginResponse {
    url: String,
}

#[derive(Debug, PartialEq, Serialize)]
struct SimpleResponse {
    status: String,
    /// JSON error payload, as reported by `/status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn from_result(status: &str, result: Result<(), PlaybackError>) -> Self {
        match result {
            Ok(()) => Self::ok(status),
            Err(e) => Self {
                status: "error".into(),
                error: Some(e.payload()),
            },
        }
    }
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/read", post(handle_read))
        .route("/play", post(handle_play))
        .route("/pause", post(handle_pause))
        .route("/stop", post(handle_stop))
        .route("/forward", post(handle_forward))
        .route("/rewind", post(handle_rewind))
        .route("/seek", post(handle_seek))
        .route("/status", get(handle_status))
        .route("/position", get(handle_position))
        .route("/voices", get(handle_voices))
        .route("/preferences", get(handle_get_preferences).post(handle_set_preferences))
        .route("/auth/login", get(handle_login))
        .route("/auth/callback", get(handle_callback))
        .route("/auth/logout", post(handle_logout))
        .with_state(state)
}

/// Start the API server as a background tokio task.
pub async fn start_api(state: ApiState) {
    let addr = format!("127.0.0.1:{}", state.port);
    let app = router(state);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind API on {addr}: {e}");
            return;
        }
    };
    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("API server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_read(State(state): State<ApiState>, Json(req): Json<ReadRequest>) -> Json<SimpleResponse> {
    let preview: String = req.selection_text.chars().take(80).collect();
    info!(
        "HTTP /read: \"{}{}\" ({} chars, lang={:?})",
        preview.replace('\n', " "),
        if req.selection_text.chars().count() > 80 { "..." } else { "" },
        req.selection_text.chars().count(),
        req.lang,
    );
    let result = state.supervisor.read(req.selection_text, req.lang).await;
    Json(SimpleResponse::from_result("reading", result))
}

async fn handle_play(State(state): State<ApiState>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("playing", state.supervisor.play().await))
}

async fn handle_pause(State(state): State<ApiState>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("paused", state.supervisor.pause().await))
}

async fn handle_stop(State(state): State<ApiState>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("stopped", state.supervisor.stop().await))
}

async fn handle_forward(State(state): State<ApiState>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("ok", state.supervisor.forward().await))
}

async fn handle_rewind(State(state): State<ApiState>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("ok", state.supervisor.rewind().await))
}

async fn handle_seek(State(state): State<ApiState>, Json(req): Json<SeekRequest>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("ok", state.supervisor.seek(req.index).await))
}

async fn handle_status(State(state): State<ApiState>) -> Json<Status> {
    Json(state.supervisor.status().await)
}

async fn handle_position(State(state): State<ApiState>) -> Json<Option<Position>> {
    Json(state.supervisor.position().await)
}

async fn handle_voices(State(state): State<ApiState>) -> Json<Vec<Voice>> {
    Json(state.engines.voices().await)
}

async fn handle_get_preferences(State(state): State<ApiState>) -> Json<SpeechPreferences> {
    Json(state.settings.speech_preferences().await.unwrap_or_default())
}

async fn handle_set_preferences(
    State(state): State<ApiState>,
    Json(prefs): Json<SpeechPreferences>,
) -> Json<SpeechPreferences> {
    state.settings.save_speech_preferences(&prefs).await;
    info!("Speech preferences updated: {prefs:?}");
    Json(prefs)
}

async fn handle_login(State(state): State<ApiState>) -> Json<LoginResponse> {
    let callback = format!("http://127.0.0.1:{}/auth/callback", state.port);
    let url = auth::login_url(&state.web_app_url, &callback);
    info!("Login URL: {url}");
    Json(LoginResponse { url })
}

async fn handle_callback(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<SimpleResponse> {
    let result = auth::complete_login(&state.settings, &params).await;
    Json(SimpleResponse::from_result("signed_in", result))
}

async fn handle_logout(State(state): State<ApiState>) -> Json<SimpleResponse> {
    auth::logout(&state.settings).await;
    Json(SimpleResponse::ok("signed_out"))
}
