//! Configuration types for page render cells and the Pdfium page source.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a [`PageRenderCell`](crate::PageRenderCell).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Physical-to-logical pixel ratio of the display the cell is shown on.
    /// Default: 1.0.
    pub device_pixel_ratio: f64,

    /// Drop the rasterization of a request as soon as a newer request is issued,
    /// instead of letting it finish and discarding the result.
    /// Default: false.
    pub abort_superseded: bool,

    /// Largest surface, in device pixels, a render may allocate.
    /// Requests above it fail without touching the live surface.
    /// Default: 2^26 (256 MiB of RGBA).
    pub max_surface_pixels: u64,
}

/// Default pixel budget for one surface.
pub const DEFAULT_MAX_SURFACE_PIXELS: u64 = 1 << 26;

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            abort_superseded: false,
            max_surface_pixels: DEFAULT_MAX_SURFACE_PIXELS,
        }
    }
}

impl CellConfig {
    /// Create a cell config for a display with the given pixel ratio.
    pub fn with_device_pixel_ratio(device_pixel_ratio: f64) -> Self {
        Self {
            device_pixel_ratio,
            ..Default::default()
        }
    }

    /// Enable or disable aborting superseded rasterizations.
    pub fn abort_superseded(mut self, enabled: bool) -> Self {
        self.abort_superseded = enabled;
        self
    }

    /// Set the pixel budget for one surface.
    pub fn max_surface_pixels(mut self, max_pixels: u64) -> Self {
        self.max_surface_pixels = max_pixels;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(crate::error::RenderError::InvalidConfig(format!(
                "device_pixel_ratio must be a positive finite number, got {}",
                self.device_pixel_ratio
            )));
        }
        if self.max_surface_pixels == 0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "max_surface_pixels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the Pdfium-backed page source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfiumConfig {
    /// Directory containing the Pdfium shared library.
    /// If None, the working directory, common system locations and
    /// the system loader are tried in turn.
    pub library_path: Option<PathBuf>,

    /// Number of threads used to composite rendered pages.
    /// Default: number of CPU cores.
    pub render_threads: usize,

    /// Keep the alpha channel of rendered pages.
    /// Default: false.
    pub use_alpha: bool,

    /// Background color for pages (if not using alpha).
    /// Default: white (255, 255, 255).
    pub background_color: (u8, u8, u8),
}

impl Default for PdfiumConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            render_threads: num_cpus::get(),
            use_alpha: false,
            background_color: (255, 255, 255),
        }
    }
}

impl PdfiumConfig {
    /// Set the directory holding the Pdfium library.
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Set the number of compositing threads.
    pub fn render_threads(mut self, threads: usize) -> Self {
        self.render_threads = threads;
        self
    }

    /// Keep the alpha channel.
    pub fn use_alpha(mut self, enabled: bool) -> Self {
        self.use_alpha = enabled;
        self
    }

    /// Set the page background color.
    pub fn background_color(mut self, rgb: (u8, u8, u8)) -> Self {
        self.background_color = rgb;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.render_threads == 0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "render_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
