//! # Image Service
//!
//! Ties the session store, cooldown limiter, dispatcher and media pipeline
//! together into the operations the chat handlers expose: generate from a
//! prompt, register an upload and transform the pending upload. The
//! transformation state is read from and written to the chat's
//! [`TransformDialogue`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::generation::{GeneratedImage, GenerationDispatcher};
use crate::generation_errors::GenerationError;
use crate::media::{self, GalleryEntry, ImageKind, MediaStore, SavedImage};
use crate::openai::OpenAiImageClient;
use crate::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::session::{Counter, InMemorySessionStore, SessionStore, UserSession};
use crate::transform::{derive_prompt, TransformDialogue, TransformState};

/// Result of a successful generation or transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub image: GeneratedImage,
    /// Archived copy, `None` when archival failed
    pub saved: Option<SavedImage>,
    /// Counter value after this success
    pub total: u64,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no uploaded image is waiting for an instruction")]
    NoPendingUpload,
    #[error("a transformation is already running")]
    AlreadyProcessing,
    #[error("uploaded image could not be prepared: {0}")]
    Preparation(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("transformation state unavailable: {0}")]
    State(String),
}

pub struct ImageService {
    sessions: Arc<dyn SessionStore>,
    limiter: RateLimiter,
    dispatcher: GenerationDispatcher,
    media: MediaStore,
}

impl ImageService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        limiter: RateLimiter,
        dispatcher: GenerationDispatcher,
        media: MediaStore,
    ) -> Self {
        Self {
            sessions,
            limiter,
            dispatcher,
            media,
        }
    }

    /// Wire the production stack: OpenAI client, in-memory sessions and the
    /// configured directories.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let generator = Arc::new(OpenAiImageClient::new(config)?);
        let media = MediaStore::new(
            &config.generated_dir,
            &config.uploaded_dir,
            config.recovery.download_timeout,
        )?;

        Ok(Self::new(
            Arc::new(InMemorySessionStore::new()),
            RateLimiter::new(config.cooldown),
            GenerationDispatcher::new(generator, config.recovery.clone()),
            media,
        ))
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.limiter.cooldown().as_secs()
    }

    pub fn session(&self, user_id: u64) -> UserSession {
        self.sessions.get(user_id)
    }

    /// Apply the cooldown to a request about to hit the generation API
    pub fn admit(&self, user_id: u64) -> RateLimitDecision {
        let decision = self.limiter.check(user_id, Instant::now());
        if !decision.allowed {
            info!(user_id, wait_seconds = decision.wait_seconds, "Request rejected by cooldown");
        }
        decision
    }

    /// Generate an image for a free-text prompt.
    pub async fn generate(&self, user_id: u64, prompt: &str) -> Result<GenerationOutcome, GenerationError> {
        let image = self.dispatcher.generate(prompt).await?;

        let total = self.sessions.increment(user_id, Counter::ImagesGenerated);
        let mut session = self.sessions.get(user_id);
        session.last_prompt = Some(prompt.to_string());
        self.sessions.set(user_id, session);

        let saved = self.media.save(&image.url, user_id, ImageKind::Generated).await;

        info!(user_id, total, archived = saved.is_some(), "Generated image");
        Ok(GenerationOutcome { image, saved, total })
    }

    /// Store an uploaded photo and make it the chat's pending upload.
    ///
    /// A previous pending upload is replaced.
    pub async fn register_upload(
        &self,
        user_id: u64,
        bytes: &[u8],
        dialogue: &TransformDialogue,
    ) -> anyhow::Result<SavedImage> {
        let saved = self.media.save_upload(bytes, user_id)?;

        dialogue
            .update(TransformState::AwaitingInstruction {
                upload: saved.path.clone(),
            })
            .await?;
        let total = self.sessions.increment(user_id, Counter::ImagesUploaded);

        info!(user_id, path = %saved.path.display(), total, "Stored upload");
        Ok(saved)
    }

    /// Transform the pending upload according to `instruction`.
    ///
    /// On success the pending upload is cleared; on any failure the chat is
    /// put back in the awaiting state with the same upload.
    pub async fn transform(
        &self,
        user_id: u64,
        instruction: &str,
        dialogue: &TransformDialogue,
    ) -> Result<GenerationOutcome, TransformError> {
        let upload = match load_state(dialogue).await? {
            TransformState::Idle => return Err(TransformError::NoPendingUpload),
            TransformState::Processing { .. } => return Err(TransformError::AlreadyProcessing),
            TransformState::AwaitingInstruction { upload } => upload,
        };
        store_state(
            dialogue,
            TransformState::Processing {
                upload: upload.clone(),
            },
        )
        .await?;

        let result = self.run_transform(user_id, &upload, instruction).await;

        match result {
            Ok(image) => {
                store_state(dialogue, TransformState::Idle).await?;
                let mut session = self.sessions.get(user_id);
                session.last_prompt = Some(instruction.to_string());
                self.sessions.set(user_id, session);
                let total = self.sessions.increment(user_id, Counter::ImagesTransformed);

                let saved = self
                    .media
                    .save(&image.url, user_id, ImageKind::Transformed)
                    .await;

                info!(user_id, total, archived = saved.is_some(), "Transformed image");
                Ok(GenerationOutcome { image, saved, total })
            }
            Err(e) => {
                // Only restore if nothing replaced the upload meanwhile
                let current = load_state(dialogue).await?;
                if current.pending_upload() == Some(upload.as_path()) {
                    store_state(dialogue, TransformState::AwaitingInstruction { upload }).await?;
                }
                warn!(user_id, error = %e, "Transformation failed, upload kept for retry");
                Err(e)
            }
        }
    }

    async fn run_transform(
        &self,
        user_id: u64,
        upload: &Path,
        instruction: &str,
    ) -> Result<GeneratedImage, TransformError> {
        let prepared = prepare_blocking(upload.to_path_buf()).await.map_err(|e| {
            error!(user_id, upload = %upload.display(), error = %e, "Failed to prepare upload");
            TransformError::Preparation(e.to_string())
        })?;

        let result = self.dispatcher.generate(&derive_prompt(instruction)).await;
        media::discard(&prepared);

        Ok(result?)
    }

    /// Cancel the pending transformation and delete the user's uploads.
    ///
    /// Returns the number of upload files removed.
    pub async fn clear(&self, user_id: u64, dialogue: &TransformDialogue) -> anyhow::Result<usize> {
        dialogue.update(TransformState::Idle).await?;
        self.media.clear_uploads(user_id)
    }

    /// Upper bound for downloading a user's photo from Telegram
    pub fn download_timeout(&self) -> Duration {
        self.media.download_timeout()
    }

    pub fn gallery(&self, user_id: u64) -> anyhow::Result<Vec<GalleryEntry>> {
        self.media.gallery(user_id)
    }
}

async fn load_state(dialogue: &TransformDialogue) -> Result<TransformState, TransformError> {
    dialogue
        .get_or_default()
        .await
        .map_err(|e| TransformError::State(e.to_string()))
}

async fn store_state(dialogue: &TransformDialogue, state: TransformState) -> Result<(), TransformError> {
    dialogue
        .update(state)
        .await
        .map_err(|e| TransformError::State(e.to_string()))
}

async fn prepare_blocking(upload: PathBuf) -> anyhow::Result<PathBuf> {
    tokio::task::spawn_blocking(move || media::prepare(&upload)).await?
}
