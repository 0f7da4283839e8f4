//! Document controller: reads a text source unit by unit.
//!
//! Each unit of the source becomes one `Speech`. When a speech finishes the
//! controller moves the source cursor forward and reads the next unit, until
//! the source runs out.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::engine::remote::encode_component;
use crate::error::PlaybackError;
use crate::player::{PlayerContext, PlayerEvent, PlayerState, Position, Progress, Speech, SpeechFactory};
use crate::settings::Settings;
use crate::text::preprocess::preprocess;

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\r?\n){2,}").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    pub lang: Option<String>,
}

/// Something that hands out text a unit at a time.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn ready(&self) -> Result<SourceInfo, PlaybackError>;

    /// Still producing text that isn't available yet.
    fn is_waiting(&self) -> bool {
        false
    }

    async fn current_index(&self) -> usize;

    /// Texts of unit `index`, `None` past the end. An empty unit is skipped.
    async fn texts(&self, index: usize) -> Result<Option<Vec<String>>, PlaybackError>;

    async fn close(&self) {}

    /// Identifies the document for the `lastUrl` setting.
    fn uri(&self) -> String;
}

/// A text selection served as a single unit.
pub struct SimpleSource {
    texts: Vec<String>,
    lang: Option<String>,
}

impl SimpleSource {
    pub fn new(text: &str, lang: Option<String>) -> Self {
        let texts = PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { texts, lang }
    }
}

#[async_trait]
impl TextSource for SimpleSource {
    async fn ready(&self) -> Result<SourceInfo, PlaybackError> {
        Ok(SourceInfo {
            lang: self.lang.clone(),
        })
    }

    async fn current_index(&self) -> usize {
        0
    }

    async fn texts(&self, index: usize) -> Result<Option<Vec<String>>, PlaybackError> {
        Ok((index == 0).then(|| self.texts.clone()))
    }

    fn uri(&self) -> String {
        let len: usize = self.texts.iter().map(|t| t.chars().count()).sum();
        let head: String = self
            .texts
            .first()
            .map(|t| t.chars().take(100).collect())
            .unwrap_or_default();
        format!("text-selection:({len}){}", encode_component(&head))
    }
}

pub struct Doc {
    source: Box<dyn TextSource>,
    info: SourceInfo,
    factory: Arc<SpeechFactory>,
    ctx: PlayerContext,
    current_index: usize,
    active: Option<Speech>,
    found_text: bool,
}

impl Doc {
    /// Record the document as last read and wait for the source.
    pub async fn open(
        source: Box<dyn TextSource>,
        factory: Arc<SpeechFactory>,
        settings: &Settings,
        ctx: PlayerContext,
    ) -> Result<Self, PlaybackError> {
        let uri = source.uri();
        settings.save_last_url(&uri).await;
        let info = source.ready().await?;
        debug!("Opened {uri} (lang {:?})", info.lang);
        Ok(Self {
            source,
            info,
            factory,
            ctx,
            current_index: 0,
            active: None,
            found_text: false,
        })
    }

    /// Resume the active speech, or start reading at the source's cursor.
    pub async fn play(&mut self) -> Result<Progress, PlaybackError> {
        if let Some(speech) = self.active.as_mut() {
            let progress = speech.play();
            return self.after(progress).await;
        }
        if self.source.is_waiting() {
            debug!("Source still loading");
        }
        self.current_index = self.source.current_index().await;
        self.read_current().await
    }

    async fn read_current(&mut self) -> Result<Progress, PlaybackError> {
        loop {
            let texts = match self.source.texts(self.current_index).await {
                Ok(texts) => texts,
                Err(e) => {
                    warn!("Failed to get texts for unit {}: {e}", self.current_index);
                    None
                }
            };

            let Some(texts) = texts else {
                if !self.found_text {
                    return Err(PlaybackError::NoTextFound);
                }
                info!("End of document");
                return Ok(Progress::Finished);
            };
            if texts.is_empty() {
                self.current_index += 1;
                continue;
            }

            self.found_text = true;
            let texts: Vec<String> = texts.iter().map(|t| preprocess(t)).collect();
            let mut speech = self
                .factory
                .create(&texts, self.info.lang.as_deref(), self.ctx.clone())
                .await?;
            debug!("Reading unit {} ({} chunks)", self.current_index, speech.chunk_count());
            match speech.play() {
                Progress::Continuing => {
                    self.active = Some(speech);
                    return Ok(Progress::Continuing);
                }
                Progress::Finished => self.current_index += 1,
            }
        }
    }

    /// Move on to the next unit once the active speech is done.
    async fn after(&mut self, progress: Progress) -> Result<Progress, PlaybackError> {
        match progress {
            Progress::Continuing => Ok(Progress::Continuing),
            Progress::Finished => {
                self.active = None;
                self.current_index += 1;
                self.read_current().await
            }
        }
    }

    pub async fn handle(&mut self, event: PlayerEvent) -> Result<Progress, PlaybackError> {
        let Some(speech) = self.active.as_mut() else {
            return Ok(Progress::Continuing);
        };
        let progress = speech.handle(event)?;
        self.after(progress).await
    }

    /// Stop but keep the active speech and its cursor.
    pub async fn pause(&mut self) {
        if let Some(speech) = self.active.as_mut() {
            speech.stop().await;
        }
    }

    pub async fn stop(&mut self) {
        if let Some(mut speech) = self.active.take() {
            speech.stop().await;
        }
    }

    pub async fn close(&mut self) {
        self.stop().await;
        self.source.close().await;
    }

    pub async fn forward(&mut self) -> Result<(), PlaybackError> {
        match self.active.as_mut() {
            Some(speech) => speech.forward().await,
            None => Err(PlaybackError::NotPlaying),
        }
    }

    pub async fn rewind(&mut self) -> Result<(), PlaybackError> {
        match self.active.as_mut() {
            Some(speech) => speech.rewind().await,
            None => Err(PlaybackError::NotPlaying),
        }
    }

    pub async fn seek(&mut self, index: usize) -> Result<Progress, PlaybackError> {
        let Some(speech) = self.active.as_mut() else {
            return Err(PlaybackError::NotPlaying);
        };
        let progress = speech.seek(index).await;
        self.after(progress).await
    }

    /// The active speech's state; with none, LOADING while the source is
    /// still producing text.
    pub fn state(&self) -> PlayerState {
        match &self.active {
            Some(speech) => speech.state(),
            None if self.source.is_waiting() => PlayerState::Loading,
            None => PlayerState::Stopped,
        }
    }

    pub fn position(&self) -> Option<Position> {
        self.active.as_ref().map(Speech::position)
    }
}
