//! Utterance player: speaks a chunk sequence through one engine.
//!
//! A `Speech` never blocks on audio. Each chunk is spoken by a spawned task
//! that reports back as `PlayerEvent`s on the context channel; whoever owns
//! the `Speech` feeds those events to `handle`. Every chunk run and delayed
//! restart carries a ticket, and events whose ticket is no longer current
//! are dropped, so nothing from a stopped chunk can move the cursor.

pub mod delayed;
pub mod factory;
#[cfg(test)]
pub mod testing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{EngineEvent, SpeakOptions, TtsEngine};
use crate::error::PlaybackError;
use delayed::DelayedTask;

pub use factory::SpeechFactory;

/// Externally visible playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerState {
    Loading,
    Playing,
    Stopped,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "LOADING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub index: usize,
    pub texts: Vec<String>,
    pub is_rtl: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ChunkStarted { ticket: u64 },
    ChunkFinished { ticket: u64, result: Result<(), PlaybackError> },
    DelayedRestart { ticket: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continuing,
    Finished,
}

/// Monotonic ticket source shared by every player on one event channel.
#[derive(Debug, Clone, Default)]
pub struct Tickets(Arc<AtomicU64>);

impl Tickets {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerTiming {
    /// A rewind this soon after a chunk started replays that chunk.
    pub rewind_window: Duration,
    pub debounce: Duration,
    /// Hold between a chunk ending and the next one starting.
    pub chunk_gap: Duration,
}

impl Default for PlayerTiming {
    fn default() -> Self {
        Self {
            rewind_window: Duration::from_secs(3),
            debounce: Duration::from_millis(750),
            chunk_gap: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerContext {
    pub events: mpsc::UnboundedSender<PlayerEvent>,
    pub tickets: Tickets,
    pub timing: PlayerTiming,
}

impl PlayerContext {
    pub fn new(events: mpsc::UnboundedSender<PlayerEvent>, timing: PlayerTiming) -> Self {
        Self {
            events,
            tickets: Tickets::default(),
            timing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayState {
    Idle,
    Playing { started_at: Instant },
}

struct ChunkRun {
    ticket: u64,
    cancel: CancellationToken,
}

struct PendingRestart {
    ticket: u64,
    _task: DelayedTask,
}

pub struct Speech {
    engine: Arc<dyn TtsEngine>,
    options: Arc<SpeakOptions>,
    texts: Vec<String>,
    index: usize,
    is_rtl: bool,
    state: PlayState,
    run: Option<ChunkRun>,
    pending_restart: Option<PendingRestart>,
    ctx: PlayerContext,
}

impl std::fmt::Debug for Speech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speech")
            .field("engine", &self.engine.kind())
            .field("voice", &self.options.voice.name)
            .field("index", &self.index)
            .field("chunks", &self.texts.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Speech {
    /// `texts` are the final chunks; no further segmentation happens here.
    pub fn new(
        engine: Arc<dyn TtsEngine>,
        options: SpeakOptions,
        texts: Vec<String>,
        is_rtl: bool,
        ctx: PlayerContext,
    ) -> Self {
        Self {
            engine,
            options: Arc::new(options),
            texts,
            index: 0,
            is_rtl,
            state: PlayState::Idle,
            run: None,
            pending_restart: None,
            ctx,
        }
    }

    pub fn options(&self) -> &SpeakOptions {
        &self.options
    }

    pub fn chunk_count(&self) -> usize {
        self.texts.len()
    }

    fn is_playing(&self) -> bool {
        matches!(self.state, PlayState::Playing { .. })
    }

    /// Start or resume from the cursor. Does nothing if already playing.
    pub fn play(&mut self) -> Progress {
        if self.is_playing() {
            return Progress::Continuing;
        }
        if self.index >= self.texts.len() {
            self.state = PlayState::Idle;
            return Progress::Finished;
        }
        self.start_chunk();
        Progress::Continuing
    }

    fn start_chunk(&mut self) {
        let ticket = self.ctx.tickets.next();
        let cancel = CancellationToken::new();
        self.state = PlayState::Playing {
            started_at: Instant::now(),
        };
        self.run = Some(ChunkRun {
            ticket,
            cancel: cancel.clone(),
        });
        debug!("Speaking chunk {}/{} (ticket {ticket})", self.index + 1, self.texts.len());

        let engine = self.engine.clone();
        let options = self.options.clone();
        let text = self.texts[self.index].clone();
        let events = self.ctx.events.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = speak_chunk(engine.as_ref(), &text, &options, ticket, &events) => result,
            };
            let _ = events.send(PlayerEvent::ChunkFinished { ticket, result });
        });
    }

    /// Cancel the chunk in flight without touching the cursor or state.
    async fn halt(&mut self) {
        self.pending_restart = None;
        self.engine.set_next_start_time(None);
        if let Some(run) = self.run.take() {
            run.cancel.cancel();
            self.engine.stop().await;
        }
    }

    pub async fn stop(&mut self) {
        self.halt().await;
        self.state = PlayState::Idle;
    }

    /// Stop now and play from the cursor once the debounce delay passes
    /// without another restart.
    async fn restart_debounced(&mut self) {
        self.halt().await;
        self.state = PlayState::Playing {
            started_at: Instant::now(),
        };
        let ticket = self.ctx.tickets.next();
        let events = self.ctx.events.clone();
        let task = DelayedTask::spawn(self.ctx.timing.debounce, async move {
            let _ = events.send(PlayerEvent::DelayedRestart { ticket });
        });
        self.pending_restart = Some(PendingRestart { ticket, _task: task });
    }

    pub async fn forward(&mut self) -> Result<(), PlaybackError> {
        if self.index + 1 >= self.texts.len() {
            return Err(PlaybackError::CantForward);
        }
        self.index += 1;
        if self.is_playing() {
            self.restart_debounced().await;
        } else {
            self.stop().await;
        }
        Ok(())
    }

    pub async fn rewind(&mut self) -> Result<(), PlaybackError> {
        if let PlayState::Playing { started_at } = self.state {
            if started_at.elapsed() < self.ctx.timing.rewind_window {
                self.restart_debounced().await;
                return Ok(());
            }
        }
        if self.index == 0 {
            return Err(PlaybackError::CantRewind);
        }
        self.index -= 1;
        if self.is_playing() {
            self.restart_debounced().await;
        } else {
            self.stop().await;
        }
        Ok(())
    }

    pub async fn seek(&mut self, index: usize) -> Progress {
        self.stop().await;
        self.index = index;
        self.play()
    }

    /// Feed back an event from this player's context channel.
    pub fn handle(&mut self, event: PlayerEvent) -> Result<Progress, PlaybackError> {
        match event {
            PlayerEvent::ChunkStarted { ticket } => {
                if !self.is_current_run(ticket) {
                    return Ok(Progress::Continuing);
                }
                if let Some(next) = self.texts.get(self.index + 1) {
                    let engine = self.engine.clone();
                    let options = self.options.clone();
                    let next = next.clone();
                    tokio::spawn(async move { engine.prefetch(&next, &options).await });
                }
                Ok(Progress::Continuing)
            }
            PlayerEvent::ChunkFinished { ticket, result } => {
                if !self.is_current_run(ticket) {
                    debug!("Ignoring stale chunk result (ticket {ticket})");
                    return Ok(Progress::Continuing);
                }
                self.run = None;
                self.state = PlayState::Idle;
                result?;
                self.index += 1;
                if self.index < self.texts.len() {
                    let at = std::time::Instant::now() + self.ctx.timing.chunk_gap;
                    self.engine.set_next_start_time(Some(at));
                }
                Ok(self.play())
            }
            PlayerEvent::DelayedRestart { ticket } => {
                if self.pending_restart.as_ref().map(|p| p.ticket) != Some(ticket) {
                    return Ok(Progress::Continuing);
                }
                self.pending_restart = None;
                self.state = PlayState::Idle;
                info!("Restarting at chunk {}", self.index + 1);
                Ok(self.play())
            }
        }
    }

    fn is_current_run(&self, ticket: u64) -> bool {
        self.run.as_ref().map(|r| r.ticket) == Some(ticket)
    }

    pub fn state(&self) -> PlayerState {
        match self.state {
            PlayState::Idle => PlayerState::Stopped,
            PlayState::Playing { .. } if self.engine.is_speaking() => PlayerState::Playing,
            PlayState::Playing { .. } => PlayerState::Loading,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            index: self.index,
            texts: self.texts.clone(),
            is_rtl: self.is_rtl,
        }
    }
}

impl Drop for Speech {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel.cancel();
        }
    }
}

/// Speak one chunk and check the engine reports start before end.
async fn speak_chunk(
    engine: &dyn TtsEngine,
    text: &str,
    options: &SpeakOptions,
    ticket: u64,
    events: &mpsc::UnboundedSender<PlayerEvent>,
) -> Result<(), PlaybackError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let speak = engine.speak(text, options, tx);
    tokio::pin!(speak);
    let mut speak_done = false;
    let mut started = false;

    loop {
        tokio::select! {
            _ = &mut speak, if !speak_done => speak_done = true,
            event = rx.recv() => match event {
                Some(EngineEvent::Start) => {
                    if !started {
                        started = true;
                        let _ = events.send(PlayerEvent::ChunkStarted { ticket });
                    }
                }
                Some(EngineEvent::End) if started => return Ok(()),
                Some(EngineEvent::End) => {
                    return Err(PlaybackError::ProtocolViolation(
                        "end event before start event".into(),
                    ))
                }
                Some(EngineEvent::Error(e)) => return Err(e),
                None => return Err(PlaybackError::Interrupted),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{drive, Script, ScriptedEngine};
    use super::*;
    use crate::engine::EngineKind;
    use crate::voice::Voice;

    fn speech(engine: Arc<ScriptedEngine>, texts: &[&str]) -> (Speech, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = SpeakOptions {
            voice: Voice::new("Test", Some("en-US"), EngineKind::Local),
            lang: "en-US".into(),
            rate: 1.0,
            volume: 1.0,
        };
        let texts = texts.iter().map(|t| t.to_string()).collect();
        let speech = Speech::new(engine, options, texts, false, PlayerContext::new(tx, PlayerTiming::default()));
        (speech, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_all_chunks_in_order() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two", "three"]);

        assert_eq!(speech.play(), Progress::Continuing);
        assert_eq!(drive(&mut speech, &mut rx).await, Ok(()));
        assert_eq!(engine.spoken(), vec!["one", "two", "three"]);
        assert_eq!(speech.position().index, 3);
        assert_eq!(speech.state(), PlayerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedules_next_chunk_after_gap() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Remote));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timing = PlayerTiming {
            chunk_gap: Duration::from_millis(200),
            ..PlayerTiming::default()
        };
        let options = SpeakOptions {
            voice: Voice::new("Test", None, EngineKind::Remote),
            lang: "en-US".into(),
            rate: 1.0,
            volume: 1.0,
        };
        let mut speech = Speech::new(
            engine.clone(),
            options,
            vec!["one".into(), "two".into()],
            false,
            PlayerContext::new(tx, timing),
        );

        let before = std::time::Instant::now();
        speech.play();
        drive(&mut speech, &mut rx).await.unwrap();

        // Only the hand-over from "one" to "two" is scheduled.
        let schedule = engine.schedule();
        assert_eq!(schedule.len(), 1);
        let at = schedule[0].unwrap();
        assert!(at >= before + Duration::from_millis(200));

        // A stop clears any pending start time.
        speech.stop().await;
        assert_eq!(engine.schedule().last(), Some(&None));
    }

    #[test]
    fn test_debug_names_engine_and_cursor() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = SpeakOptions {
            voice: Voice::new("Test", Some("en-US"), EngineKind::Local),
            lang: "en-US".into(),
            rate: 1.0,
            volume: 1.0,
        };
        let ctx = PlayerContext::new(tx, PlayerTiming::default());
        let speech = Speech::new(engine, options, vec!["one".into()], false, ctx);
        let debug = format!("{speech:?}");
        assert!(debug.contains("engine: Local"));
        assert!(debug.contains("index: 0"));
        assert!(debug.contains("chunks: 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetches_following_chunk() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two"]);
        speech.play();
        drive(&mut speech, &mut rx).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(engine.prefetched(), vec!["two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_is_idempotent() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, mut rx) = speech(engine.clone(), &["one"]);
        speech.play();
        speech.play();
        drive(&mut speech, &mut rx).await.unwrap();
        assert_eq!(engine.spoken(), vec!["one"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_past_end_finishes() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, _rx) = speech(engine.clone(), &["one", "two"]);
        assert_eq!(speech.seek(5).await, Progress::Finished);
        assert_eq!(speech.state(), PlayerState::Stopped);
        assert!(engine.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_plays_from_index() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two", "three"]);
        assert_eq!(speech.seek(2).await, Progress::Continuing);
        drive(&mut speech, &mut rx).await.unwrap();
        assert_eq!(engine.spoken(), vec!["three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_bounds_when_idle() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, _rx) = speech(engine, &["one", "two"]);
        assert_eq!(speech.rewind().await, Err(PlaybackError::CantRewind));
        assert_eq!(speech.forward().await, Ok(()));
        assert_eq!(speech.position().index, 1);
        assert_eq!(speech.forward().await, Err(PlaybackError::CantForward));
        assert_eq!(speech.rewind().await, Ok(()));
        assert_eq!(speech.position().index, 0);
        assert_eq!(speech.state(), PlayerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_before_start_is_protocol_violation() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        engine.script("bad", Script::EndBeforeStart);
        let (mut speech, mut rx) = speech(engine, &["bad"]);
        speech.play();
        assert!(matches!(
            drive(&mut speech, &mut rx).await,
            Err(PlaybackError::ProtocolViolation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_after_start_aborts() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        engine.script("two", Script::FailAfterStart(PlaybackError::Engine("boom".into())));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two", "three"]);
        speech.play();
        assert_eq!(
            drive(&mut speech, &mut rx).await,
            Err(PlaybackError::Engine("boom".into()))
        );
        assert_eq!(engine.spoken(), vec!["one", "two"]);
        assert_eq!(speech.position().index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_while_playing_restarts_after_debounce() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        engine.script("one", Script::Hang);
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two"]);
        speech.play();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(speech.state(), PlayerState::Playing);

        speech.forward().await.unwrap();
        assert_eq!(speech.state(), PlayerState::Loading);
        drive(&mut speech, &mut rx).await.unwrap();
        assert_eq!(engine.spoken(), vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewind_soon_after_start_replays_chunk() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        engine.script("two", Script::Speak(Duration::from_secs(10)));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two"]);
        speech.seek(1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        speech.rewind().await.unwrap();
        assert_eq!(speech.position().index, 1);
        drive(&mut speech, &mut rx).await.unwrap();
        assert_eq!(engine.spoken(), vec!["two", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewind_late_in_chunk_moves_back() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        engine.script("two", Script::Speak(Duration::from_secs(10)));
        let (mut speech, mut rx) = speech(engine.clone(), &["one", "two"]);
        speech.seek(1).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        speech.rewind().await.unwrap();
        assert_eq!(speech.position().index, 0);
        drive(&mut speech, &mut rx).await.unwrap();
        assert_eq!(engine.spoken(), vec!["two", "one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_after_stop_are_ignored() {
        let engine = Arc::new(ScriptedEngine::new(EngineKind::Local));
        let (mut speech, _rx) = speech(engine, &["one", "two"]);
        speech.play();
        let old = speech.run.as_ref().unwrap().ticket;
        speech.stop().await;

        let progress = speech
            .handle(PlayerEvent::ChunkFinished { ticket: old, result: Ok(()) })
            .unwrap();
        assert_eq!(progress, Progress::Continuing);
        assert_eq!(speech.position().index, 0);
        assert_eq!(speech.state(), PlayerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_reports_rtl() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = SpeakOptions {
            voice: Voice::new("Test", Some("ar"), EngineKind::Local),
            lang: "ar".into(),
            rate: 1.0,
            volume: 1.0,
        };
        let speech = Speech::new(
            Arc::new(ScriptedEngine::new(EngineKind::Local)),
            options,
            vec!["مرحبا".into()],
            true,
            PlayerContext::new(tx, PlayerTiming::default()),
        );
        let pos = speech.position();
        assert!(pos.is_rtl);
        assert_eq!(
            serde_json::to_value(&pos).unwrap(),
            serde_json::json!({"index": 0, "texts": ["مرحبا"], "isRtl": true})
        );
    }
}
