//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::types::ChatId;

use imagine_bot::config::RecoveryConfig;
use imagine_bot::generation::{
    GeneratedImage, GenerationDispatcher, GenerationRequest, ImageGenerator,
};
use imagine_bot::generation_errors::GenerationError;
use imagine_bot::media::MediaStore;
use imagine_bot::rate_limiter::RateLimiter;
use imagine_bot::service::ImageService;
use imagine_bot::session::InMemorySessionStore;
use imagine_bot::transform::{TransformDialogue, TransformState};

/// Nothing listens on the discard port, so archival fails fast
pub const UNREACHABLE_IMAGE_URL: &str = "http://127.0.0.1:9/generated.png";

/// Generator replaying scripted results and recording every request
#[derive(Default)]
pub struct ScriptedGenerator {
    results: Mutex<VecDeque<Result<GeneratedImage, GenerationError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(results: Vec<Result<GeneratedImage, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(image_result()))
    }
}

pub fn image_result() -> GeneratedImage {
    GeneratedImage {
        url: UNREACHABLE_IMAGE_URL.to_string(),
        revised_prompt: Some("A revised prompt".to_string()),
    }
}

pub fn connection_failure() -> GenerationError {
    GenerationError::ConnectionFailed("connection refused".to_string())
}

/// Recovery settings with a tiny retry delay so tests stay fast
pub fn fast_recovery() -> RecoveryConfig {
    RecoveryConfig {
        retry_delay: Duration::from_millis(5),
        download_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn dispatcher(generator: Arc<ScriptedGenerator>) -> GenerationDispatcher {
    GenerationDispatcher::new(generator, fast_recovery())
}

/// Service over temporary directories with the given cooldown
pub fn service(generator: Arc<ScriptedGenerator>, root: &Path, cooldown: Duration) -> ImageService {
    let media = MediaStore::new(
        root.join("generated_images"),
        root.join("uploaded_images"),
        Duration::from_secs(2),
    )
    .unwrap();

    ImageService::new(
        Arc::new(InMemorySessionStore::new()),
        RateLimiter::new(cooldown),
        dispatcher(generator),
        media,
    )
}

/// Encoded image bytes of the given size and format
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 120, 200, 128]));
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

/// Fresh transformation dialogue for one chat
pub fn dialogue(chat_id: i64) -> TransformDialogue {
    Dialogue::new(InMemStorage::<TransformState>::new(), ChatId(chat_id))
}

pub async fn state_of(dialogue: &TransformDialogue) -> TransformState {
    dialogue.get_or_default().await.unwrap()
}
