//! # Asset Upload
//!
//! Publishes images exported by the plugin sandbox to an image host and
//! returns the hosted URL. The sandbox calls this while answering export
//! requests from the UI.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod imgbb;

pub use error::UploadError;
pub use imgbb::{interpret_response, ImgbbConfig, ImgbbUploader};

use async_trait::async_trait;

/// Largest payload the image host accepts (32 MiB).
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Something that can host an image and hand back its URL.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Upload raw image bytes stored under `key`.
    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String, UploadError>;

    /// Ask the host to fetch the image at `url` and store it under `key`.
    async fn upload_url(&self, url: &str, key: &str) -> Result<String, UploadError>;
}
