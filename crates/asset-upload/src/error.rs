//! Upload errors.

use thiserror::Error;

/// Errors that can occur when publishing an asset.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from image host (non-JSON, status {status}).")]
    NonJson { status: u16 },

    #[error("{message} (image host response)")]
    Rejected { message: String },

    #[error("One of the images exceeds 32 MB, which is not supported. Please compress and retry.")]
    TooLarge,

    #[error("Missing image host response URL. Response: {body}")]
    MissingUrl { body: String },

    #[error("Invalid uploader configuration: {0}")]
    Config(String),
}
