//! Preview error types
//!
//! Only document-level failures surface as errors. Page-level failures
//! resolve to `None` from the page operations and never abort sibling pages.

use thiserror::Error;

/// Unified preview error type
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The native document handle could not be created
    #[error("Failed to open document {path}: {reason}")]
    Open { path: String, reason: String },

    /// Opening took longer than the configured limit
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Rasterizer failure while painting a page
    #[error("Engine error: {0}")]
    Engine(String),

    /// Image buffer or encoding failure
    #[error("Image error: {0}")]
    Image(String),

    /// IO error (std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was aborted
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PreviewError {
    pub fn open(path: impl Into<String>, reason: impl ToString) -> Self {
        PreviewError::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;

impl From<image::ImageError> for PreviewError {
    fn from(err: image::ImageError) -> Self {
        PreviewError::Image(err.to_string())
    }
}

#[cfg(feature = "mupdf")]
impl From<mupdf::Error> for PreviewError {
    fn from(err: mupdf::Error) -> Self {
        PreviewError::Engine(err.to_string())
    }
}
