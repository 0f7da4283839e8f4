//! Playback of downloaded audio through rodio, with cancellation.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PlaybackError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Finished,
    Cancelled,
}

pub struct AudioOutput {
    // Opened on first use so engines can be built without an audio device.
    stream: Mutex<Option<OutputStream>>,
    active_sink: Arc<Mutex<Option<Sink>>>,
    speaking: Arc<AtomicBool>,
}

impl AudioOutput {
    pub fn new() -> Self {
        Self {
            stream: Mutex::new(None),
            active_sink: Arc::new(Mutex::new(None)),
            speaking: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    /// Decode and play `bytes`, calling `on_start` once audio is queued.
    pub async fn play(
        &self,
        bytes: Vec<u8>,
        volume: f32,
        speed: f32,
        cancel: &CancellationToken,
        on_start: impl FnOnce() + Send,
    ) -> Result<PlayOutcome, PlaybackError> {
        let source = Decoder::new(Cursor::new(bytes))
            .map_err(|e| PlaybackError::Audio(format!("Failed to decode audio: {e}")))?;

        let sink = {
            let mut stream = self.stream.lock().unwrap();
            if stream.is_none() {
                // Nothing will play until the user retries from an interactive context.
                let opened = OutputStreamBuilder::open_default_stream().map_err(|e| {
                    warn!("Failed to open audio output: {e}");
                    PlaybackError::UserGestureRequired
                })?;
                *stream = Some(opened);
            }
            match stream.as_ref() {
                Some(s) => Sink::connect_new(s.mixer()),
                None => return Err(PlaybackError::Audio("No audio output stream".into())),
            }
        };

        sink.set_volume(volume);
        sink.set_speed(speed);
        sink.append(source);
        *self.active_sink.lock().unwrap() = Some(sink);
        self.speaking.store(true, Ordering::Relaxed);
        on_start();

        let outcome = loop {
            if cancel.is_cancelled() {
                break PlayOutcome::Cancelled;
            }
            let done = self
                .active_sink
                .lock()
                .unwrap()
                .as_ref()
                .map_or(true, |s| s.empty());
            if done {
                break PlayOutcome::Finished;
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        };

        if let Some(sink) = self.active_sink.lock().unwrap().take() {
            sink.stop();
        }
        self.speaking.store(false, Ordering::Relaxed);
        debug!("Audio playback {outcome:?}");
        Ok(outcome)
    }

    pub fn stop(&self) {
        if let Some(sink) = self.active_sink.lock().unwrap().take() {
            sink.stop();
        }
        self.speaking.store(false, Ordering::Relaxed);
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}
