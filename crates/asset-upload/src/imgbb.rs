//! imgbb client.
//!
//! Uploads are multipart forms with an `image` field (file bytes or a source
//! URL) and a `name` field. Hosted images expire after `expiration` seconds.

use crate::error::UploadError;
use crate::{AssetUploader, MAX_UPLOAD_BYTES};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

/// Seconds a hosted image stays available.
pub const DEFAULT_EXPIRATION_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImgbbConfig {
    pub api_key: String,
    pub endpoint: String,
    pub expiration_secs: u64,
    pub request_timeout: Duration,
}

impl ImgbbConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            expiration_secs: DEFAULT_EXPIRATION_SECS,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `IMGBB_API_KEY`: required
    /// - `IMGBB_ENDPOINT`: upload URL (default: the public imgbb API)
    pub fn from_env() -> Result<Self, UploadError> {
        let api_key = env::var("IMGBB_API_KEY")
            .map_err(|_| UploadError::Config("IMGBB_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(endpoint) = env::var("IMGBB_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.api_key.trim().is_empty() {
            return Err(UploadError::Config("API key cannot be empty".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(UploadError::Config("endpoint cannot be empty".to_string()));
        }
        Ok(())
    }
}

pub struct ImgbbUploader {
    client: Client,
    config: ImgbbConfig,
}

impl ImgbbUploader {
    pub fn new(config: ImgbbConfig) -> Result<Self, UploadError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(UploadError::Http)?;
        Ok(Self { client, config })
    }

    async fn post(&self, image: Part, key: &str) -> Result<String, UploadError> {
        let form = Form::new().part("image", image).text("name", key.to_string());
        let expiration = self.config.expiration_secs.to_string();

        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[("key", self.config.api_key.as_str()), ("expiration", expiration.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        let url = interpret_response(status, &body)?;
        debug!(key = key, url = %url, "Asset uploaded");
        Ok(url)
    }
}

#[async_trait]
impl AssetUploader for ImgbbUploader {
    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String, UploadError> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            warn!(key = key, size = bytes.len(), "Asset too large, not uploading");
            return Err(UploadError::TooLarge);
        }
        let part = Part::bytes(bytes).file_name(key.to_string());
        self.post(part, key).await
    }

    async fn upload_url(&self, url: &str, key: &str) -> Result<String, UploadError> {
        self.post(Part::text(url.to_string()), key).await
    }
}

/// Turn a raw host response into the hosted URL or an error.
///
/// Only a body that is not JSON at all counts as non-JSON. Fields are read
/// leniently, so unexpected shapes fall through to the generic failure.
pub fn interpret_response(http_status: u16, body: &str) -> Result<String, UploadError> {
    let raw: Value =
        serde_json::from_str(body).map_err(|_| UploadError::NonJson { status: http_status })?;

    if raw.get("success").and_then(Value::as_bool) != Some(true) {
        let message = match raw.pointer("/error/message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => {
                let status = raw
                    .get("status")
                    .and_then(Value::as_u64)
                    .unwrap_or(u64::from(http_status));
                format!("Image upload failed with status {status}.")
            }
        };
        warn!(status = http_status, message = %message, "Image host rejected upload");

        let lowered = message.to_lowercase();
        if lowered.contains("file too large") || lowered.contains("size") {
            return Err(UploadError::TooLarge);
        }
        return Err(UploadError::Rejected { message });
    }

    hosted_url(&raw, "/data/url")
        .or_else(|| hosted_url(&raw, "/data/display_url"))
        .ok_or_else(|| UploadError::MissingUrl {
            body: raw.to_string(),
        })
}

fn hosted_url(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
