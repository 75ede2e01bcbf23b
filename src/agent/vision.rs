//! Describe an image with the vision model: fetch, base64-encode, one call.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::cleanup::clean_reply;
use super::errors::{ChatError, UpstreamError};
use super::providers::{ImageData, LLMProvider, Message, create_vision_provider};
use crate::config::Config;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

pub struct VisionAdapter {
    client: Client,
    provider: Arc<dyn LLMProvider>,
}

impl VisionAdapter {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            provider,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            create_vision_provider(config)?,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Ask the vision model `prompt` about the image at `image_url`.
    ///
    /// `image_url` is fetched over HTTP(S); anything else is read as a local
    /// file path. Channel URLs may embed credentials, so the URL never
    /// appears in errors or logs.
    pub async fn describe(
        &self,
        image_url: &str,
        prompt: &str,
        cleanup: &[String],
    ) -> Result<String, ChatError> {
        let image = self.fetch(image_url).await?;
        debug!(
            "Describing image ({}, {} base64 bytes) with {}",
            image.media_type,
            image.data.len(),
            self.provider.model()
        );

        let message = Message::user(prompt).with_image(image);
        let response = self
            .provider
            .chat(&[message], None)
            .await
            .map_err(ChatError::upstream)?;

        Ok(clean_reply(&response.content, cleanup))
    }

    async fn fetch(&self, image_url: &str) -> Result<ImageData, ChatError> {
        if !(image_url.starts_with("http://") || image_url.starts_with("https://")) {
            let path = Path::new(image_url.strip_prefix("file://").unwrap_or(image_url));
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ChatError::ImageFetch(e.to_string()))?;
            return Ok(ImageData {
                media_type: guess_media_type(None, image_url),
                data: STANDARD.encode(&bytes),
            });
        }

        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| fetch_error(UpstreamError::from_reqwest(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(UpstreamError::from_status(status, "")));
        }

        let header = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChatError::ImageFetch(e.without_url().to_string()))?;

        Ok(ImageData {
            media_type: guess_media_type(header.as_deref(), image_url),
            data: STANDARD.encode(&bytes),
        })
    }
}

/// Auth and timeout failures keep their own user text; the rest are fetch
/// errors.
fn fetch_error(err: UpstreamError) -> ChatError {
    match err {
        UpstreamError::Auth(_) | UpstreamError::Timeout(_) => ChatError::Upstream(err),
        other => ChatError::ImageFetch(other.to_string()),
    }
}

/// Content-Type when it names an image, else the URL extension, else jpeg.
fn guess_media_type(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or_default().trim();
        if essence.starts_with("image/") {
            return essence.to_string();
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string())
}
