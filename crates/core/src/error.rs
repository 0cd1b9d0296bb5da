//! Error types for page rendering.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pagecell library.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Scale is not a positive finite number.
    #[error("Invalid scale {0}: must be a positive finite number")]
    InvalidScale(f64),

    /// The page source failed to rasterize into a surface.
    #[error("Rasterization failed: {0}")]
    RasterizationFailed(String),

    /// Pdfium library error.
    #[error("Pdfium error: {0}")]
    PdfiumError(String),

    /// Document could not be opened.
    #[error("Failed to load document '{path}': {message}")]
    DocumentLoadFailed { path: PathBuf, message: String },

    /// Page index outside the document.
    #[error("Page index {index} out of range, document has {page_count} pages")]
    PageOutOfRange { index: usize, page_count: usize },

    /// The render worker thread is gone.
    #[error("Render worker has shut down")]
    WorkerShutdown,

    /// The requested surface exceeds the configured pixel budget.
    #[error("Surface of {width}x{height} pixels exceeds the limit of {max_pixels} pixels")]
    SurfaceTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    /// Shorthand for a rasterization failure with a message.
    pub fn rasterization(msg: impl Into<String>) -> Self {
        RenderError::RasterizationFailed(msg.into())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for RenderError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        RenderError::WorkerShutdown
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for RenderError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        RenderError::WorkerShutdown
    }
}
