//! The page source seam: what the render cell needs from a page.
//!
//! A page source owns the document. The cell only sees [`PageHandle`]s, asks
//! them for a [`Viewport`] at some resolution and then for an asynchronous
//! rasterization into a [`Surface`] sized from that viewport.

use crate::error::Result;
use crate::surface::Surface;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Pixel dimensions of a page rasterized at a given resolution.
///
/// Resolution 1.0 maps one page unit (PDF point) to one logical pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in device pixels (may be fractional).
    pub width: f64,
    /// Height in device pixels (may be fractional).
    pub height: f64,
    /// Resolution the viewport was computed at.
    pub resolution: f64,
}

impl Viewport {
    /// Viewport of a page measured in points, at the given resolution.
    pub fn from_points(width_points: f64, height_points: f64, resolution: f64) -> Self {
        Self {
            width: width_points * resolution,
            height: height_points * resolution,
            resolution,
        }
    }

    /// Width of the backing bitmap. Fractional pixels are truncated.
    pub fn pixel_width(&self) -> u32 {
        to_pixels(self.width)
    }

    /// Height of the backing bitmap. Fractional pixels are truncated.
    pub fn pixel_height(&self) -> u32 {
        to_pixels(self.height)
    }
}

/// Saturates at `u32::MAX`; NaN and non-positive extents give 0.
fn to_pixels(extent: f64) -> u32 {
    if extent > 0.0 {
        extent.floor().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Resolution actually rasterized at: zoom times the display pixel ratio.
pub fn effective_resolution(scale: f64, device_pixel_ratio: f64) -> f64 {
    scale * device_pixel_ratio
}

/// A page that can be rasterized.
///
/// `version` must increase whenever the page content changes, e.g. after the
/// document is re-parsed. Two handles with the same version are treated as the
/// same content regardless of identity.
pub trait PageHandle: Send + Sync {
    /// Content version of this page.
    fn version(&self) -> u64;

    /// Viewport of the page at `resolution`.
    fn viewport(&self, resolution: f64) -> Viewport;

    /// Rasterize the page into `surface`, which was allocated from `viewport`.
    fn render_into<'a>(
        &'a self,
        surface: &'a mut Surface,
        viewport: &'a Viewport,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Shared page handle as passed through cell props.
pub type SharedPage = Arc<dyn PageHandle>;
