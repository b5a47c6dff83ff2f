//! HTTP client for the OpenAI images endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Config;
use crate::generation::{GeneratedImage, GenerationRequest, ImageGenerator, ImageQuality, ImageSize};
use crate::generation_errors::GenerationError;

#[derive(Debug, Serialize)]
struct ImagesRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: ImageSize,
    quality: ImageQuality,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ImagesResponseBody {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

pub struct OpenAiImageClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiImageClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.recovery.connect_timeout)
            .timeout(config.recovery.request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_key: config.openai_api_key.clone(),
            api_base: config.api_base.clone(),
            model: config.image_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        let body = ImagesRequestBody {
            model: &self.model,
            prompt: &request.prompt,
            size: request.size,
            quality: request.quality,
            n: 1,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = GenerationError::from_response(status.as_u16(), &text);
            error!(status = status.as_u16(), error = %err, "Image API returned an error");
            return Err(err);
        }

        let parsed: ImagesResponseBody = response.json().await?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .and_then(|data| data.url.map(|url| (url, data.revised_prompt)));

        match image {
            Some((url, revised_prompt)) => {
                debug!(model = %self.model, "Image API returned an image URL");
                Ok(GeneratedImage { url, revised_prompt })
            }
            None => Err(GenerationError::Api {
                status: Some(status.as_u16()),
                code: "empty_response".to_string(),
                message: "response contained no image URL".to_string(),
            }),
        }
    }
}
