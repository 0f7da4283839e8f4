//! Playback supervisor.
//!
//! Owns the one active document. Commands from the API and events from the
//! player arrive on channels and are handled one at a time, so playback state
//! only ever changes inside this task.
//!
//! STOPPED → (read) → LOADING ⇄ PLAYING → (end / error / stop) → STOPPED

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::document::{Doc, SimpleSource};
use crate::error::PlaybackError;
use crate::player::{PlayerContext, PlayerEvent, PlayerState, PlayerTiming, Position, Progress, SpeechFactory};
use crate::settings::Settings;

type Reply<T = ()> = oneshot::Sender<Result<T, PlaybackError>>;

#[derive(Debug)]
pub enum Command {
    Read {
        text: String,
        lang: Option<String>,
        reply: Reply,
    },
    Play(Reply),
    Pause(Reply),
    Stop(Reply),
    Forward(Reply),
    Rewind(Reply),
    Seek { index: usize, reply: Reply },
    Status(oneshot::Sender<Status>),
    Position(oneshot::Sender<Option<Position>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub state: PlayerState,
    /// Payload of the last terminal error, until the next read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Supervisor {
    factory: Arc<SpeechFactory>,
    settings: Arc<Settings>,
    ctx: PlayerContext,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<PlayerEvent>,
    doc: Option<Doc>,
    last_error: Option<PlaybackError>,
}

impl Supervisor {
    pub fn new(
        factory: Arc<SpeechFactory>,
        settings: Arc<Settings>,
        timing: PlayerTiming,
    ) -> (Self, SupervisorHandle) {
        let (cmd_tx, commands) = mpsc::channel(32);
        let (event_tx, events) = mpsc::unbounded_channel();
        let supervisor = Self {
            factory,
            settings,
            ctx: PlayerContext::new(event_tx, timing),
            commands,
            events,
            doc: None,
            last_error: None,
        };
        (supervisor, SupervisorHandle { tx: cmd_tx })
    }

    pub async fn run(mut self) {
        info!("Playback supervisor ready");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        info!("All handles dropped, supervisor exiting");
                        break;
                    }
                },
                Some(event) = self.events.recv() => {
                    if let Some(doc) = self.doc.as_mut() {
                        let result = doc.handle(event).await;
                        let _ = self.settle(result).await;
                    }
                }
            }
        }
        self.close_doc().await;
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Read { text, lang, reply } => {
                let result = self.read(text, lang).await;
                let _ = reply.send(result);
            }
            Command::Play(reply) => {
                let result = match self.doc.as_mut() {
                    Some(doc) => {
                        let progress = doc.play().await;
                        self.settle(progress).await
                    }
                    None => Err(PlaybackError::NotPlaying),
                };
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                if let Some(doc) = self.doc.as_mut() {
                    doc.pause().await;
                    info!("Paused");
                }
                let _ = reply.send(Ok(()));
            }
            Command::Stop(reply) => {
                self.close_doc().await;
                let _ = reply.send(Ok(()));
            }
            Command::Forward(reply) => {
                let result = match self.doc.as_mut() {
                    Some(doc) => doc.forward().await,
                    None => Err(PlaybackError::NotPlaying),
                };
                let _ = reply.send(result);
            }
            Command::Rewind(reply) => {
                let result = match self.doc.as_mut() {
                    Some(doc) => doc.rewind().await,
                    None => Err(PlaybackError::NotPlaying),
                };
                let _ = reply.send(result);
            }
            Command::Seek { index, reply } => {
                let result = match self.doc.as_mut() {
                    Some(doc) => {
                        let progress = doc.seek(index).await;
                        self.settle(progress).await
                    }
                    None => Err(PlaybackError::NotPlaying),
                };
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Position(reply) => {
                let _ = reply.send(self.doc.as_ref().and_then(Doc::position));
            }
        }
    }

    async fn read(&mut self, text: String, lang: Option<String>) -> Result<(), PlaybackError> {
        self.close_doc().await;
        self.last_error = None;
        info!("Reading {} chars (lang {:?})", text.chars().count(), lang);

        let source = Box::new(SimpleSource::new(&text, lang));
        let opened = Doc::open(source, self.factory.clone(), &self.settings, self.ctx.clone()).await;
        let progress = match opened {
            Ok(doc) => {
                let doc = self.doc.insert(doc);
                doc.play().await
            }
            Err(e) => Err(e),
        };
        self.settle(progress).await
    }

    /// Apply a playback result: the document is closed when it ends or fails.
    async fn settle(&mut self, result: Result<Progress, PlaybackError>) -> Result<(), PlaybackError> {
        match result {
            Ok(Progress::Continuing) => Ok(()),
            Ok(Progress::Finished) => {
                info!("Finished reading");
                self.close_doc().await;
                Ok(())
            }
            Err(e) => {
                error!("Playback failed: {e}");
                self.close_doc().await;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn close_doc(&mut self) {
        if let Some(mut doc) = self.doc.take() {
            doc.close().await;
        }
    }

    fn status(&self) -> Status {
        Status {
            state: self.doc.as_ref().map_or(PlayerState::Stopped, Doc::state),
            error: self.last_error.as_ref().map(PlaybackError::payload),
        }
    }
}

/// Cloneable sender side used by the API.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Command>,
}

impl SupervisorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(make(reply)).await.is_err() {
            warn!("Supervisor is gone");
            return Err(PlaybackError::Interrupted);
        }
        rx.await.unwrap_or(Err(PlaybackError::Interrupted))
    }

    pub async fn read(&self, text: String, lang: Option<String>) -> Result<(), PlaybackError> {
        self.request(|reply| Command::Read { text, lang, reply }).await
    }

    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.request(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<(), PlaybackError> {
        self.request(Command::Stop).await
    }

    pub async fn forward(&self) -> Result<(), PlaybackError> {
        self.request(Command::Forward).await
    }

    pub async fn rewind(&self) -> Result<(), PlaybackError> {
        self.request(Command::Rewind).await
    }

    pub async fn seek(&self, index: usize) -> Result<(), PlaybackError> {
        self.request(|reply| Command::Seek { index, reply }).await
    }

    pub async fn status(&self) -> Status {
        let stopped = Status {
            state: PlayerState::Stopped,
            error: None,
        };
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Status(reply)).await.is_err() {
            return stopped;
        }
        rx.await.unwrap_or(stopped)
    }

    pub async fn position(&self) -> Option<Position> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Position(reply)).await.ok()?;
        rx.await.ok().flatten()
    }
}
