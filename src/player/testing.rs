//! Scripted in-process engine for player, document and supervisor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{PlayerEvent, Progress, Speech};
use crate::engine::{EngineEvent, EngineKind, EventSink, SpeakOptions, TtsEngine};
use crate::error::PlaybackError;
use crate::voice::Voice;

#[derive(Debug, Clone)]
pub enum Script {
    /// Start, then end after the given time.
    Speak(Duration),
    EndBeforeStart,
    FailAfterStart(PlaybackError),
    /// Start and never end on its own.
    Hang,
}

pub struct ScriptedEngine {
    kind: EngineKind,
    scripts: Mutex<HashMap<String, Script>>,
    spoken: Mutex<Vec<String>>,
    prefetched: Mutex<Vec<String>>,
    voices: Mutex<Vec<Voice>>,
    ready: Mutex<Result<(), PlaybackError>>,
    schedule: Mutex<Vec<Option<Instant>>>,
    speaking: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl ScriptedEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            spoken: Mutex::new(Vec::new()),
            prefetched: Mutex::new(Vec::new()),
            voices: Mutex::new(Vec::new()),
            ready: Mutex::new(Ok(())),
            schedule: Mutex::new(Vec::new()),
            speaking: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_voices(self, voices: Vec<Voice>) -> Self {
        *self.voices.lock().unwrap() = voices;
        self
    }

    pub fn script(&self, text: &str, script: Script) {
        self.scripts.lock().unwrap().insert(text.to_string(), script);
    }

    pub fn set_ready(&self, ready: Result<(), PlaybackError>) {
        *self.ready.lock().unwrap() = ready;
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn prefetched(&self) -> Vec<String> {
        self.prefetched.lock().unwrap().clone()
    }

    /// Every start time set, in call order.
    pub fn schedule(&self) -> Vec<Option<Instant>> {
        self.schedule.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsEngine for ScriptedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn ready(&self) -> Result<(), PlaybackError> {
        self.ready.lock().unwrap().clone()
    }

    async fn speak(&self, text: &str, _options: &SpeakOptions, events: EventSink) {
        self.spoken.lock().unwrap().push(text.to_string());
        let cancel = self.cancel.lock().unwrap().clone();
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or(Script::Speak(Duration::from_millis(10)));

        match script {
            Script::Speak(duration) => {
                self.speaking.store(true, Ordering::Relaxed);
                let _ = events.send(EngineEvent::Start);
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {
                        let _ = events.send(EngineEvent::End);
                    }
                }
                self.speaking.store(false, Ordering::Relaxed);
            }
            Script::EndBeforeStart => {
                let _ = events.send(EngineEvent::End);
            }
            Script::FailAfterStart(e) => {
                let _ = events.send(EngineEvent::Start);
                let _ = events.send(EngineEvent::Error(e));
            }
            Script::Hang => {
                self.speaking.store(true, Ordering::Relaxed);
                let _ = events.send(EngineEvent::Start);
                cancel.cancelled().await;
                self.speaking.store(false, Ordering::Relaxed);
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
        self.voices.lock().unwrap().clone()
    }

    async fn prefetch(&self, text: &str, _options: &SpeakOptions) {
        self.prefetched.lock().unwrap().push(text.to_string());
    }

    fn set_next_start_time(&self, at: Option<Instant>) {
        self.schedule.lock().unwrap().push(at);
    }
}

/// Feed player events to `speech` until it finishes or fails.
pub async fn drive(
    speech: &mut Speech,
    rx: &mut mpsc::UnboundedReceiver<PlayerEvent>,
) -> Result<(), PlaybackError> {
    while let Some(event) = rx.recv().await {
        if speech.handle(event)? == Progress::Finished {
            return Ok(());
        }
    }
    Err(PlaybackError::Interrupted)
}
