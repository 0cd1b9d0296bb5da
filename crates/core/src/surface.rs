//! Bitmap surfaces produced by a render.

use crate::error::{RenderError, Result};
use crate::page_source::Viewport;
use image::{Rgba, RgbaImage};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// A rendered page bitmap.
///
/// The bitmap is sized in device pixels; the logical size is what the
/// surface occupies in layout, so the page stays sharp on dense displays.
pub struct Surface {
    id: SurfaceId,
    /// Generation of the render request that allocated this surface.
    generation: u64,
    bitmap: RgbaImage,
    logical_width: f64,
    logical_height: f64,
}

impl Surface {
    /// Allocate a blank, detached surface for `viewport`.
    ///
    /// Fails with [`RenderError::SurfaceTooLarge`] when the bitmap would hold
    /// more than `max_pixels` pixels. The surface starts at generation 0.
    pub fn allocate(
        viewport: &Viewport,
        device_pixel_ratio: f64,
        max_pixels: u64,
    ) -> Result<Self> {
        let (width, height) = (viewport.pixel_width(), viewport.pixel_height());
        if width as u64 * height as u64 > max_pixels {
            return Err(RenderError::SurfaceTooLarge {
                width,
                height,
                max_pixels,
            });
        }

        Ok(Self {
            id: SurfaceId::next(),
            generation: 0,
            bitmap: RgbaImage::new(width, height),
            logical_width: viewport.width / device_pixel_ratio,
            logical_height: viewport.height / device_pixel_ratio,
        })
    }

    /// Tag the surface with the request generation it was allocated for.
    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Backing width in device pixels.
    pub fn pixel_width(&self) -> u32 {
        self.bitmap.width()
    }

    /// Backing height in device pixels.
    pub fn pixel_height(&self) -> u32 {
        self.bitmap.height()
    }

    /// Layout width in logical pixels.
    pub fn logical_width(&self) -> f64 {
        self.logical_width
    }

    /// Layout height in logical pixels.
    pub fn logical_height(&self) -> f64 {
        self.logical_height
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    /// Fill the whole bitmap with one color.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.bitmap.pixels_mut() {
            *pixel = color;
        }
    }

    /// Copy `image` into the top-left corner, clipped to the surface.
    pub fn blit(&mut self, image: &RgbaImage) {
        image::imageops::replace(&mut self.bitmap, image, 0, 0);
    }

    /// Snapshot of this surface's metadata.
    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            id: self.id,
            generation: self.generation,
            pixel_width: self.pixel_width(),
            pixel_height: self.pixel_height(),
            logical_width: self.logical_width,
            logical_height: self.logical_height,
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("pixel_width", &self.pixel_width())
            .field("pixel_height", &self.pixel_height())
            .field("logical_width", &self.logical_width)
            .field("logical_height", &self.logical_height)
            .finish()
    }
}

/// Metadata of a surface, detached from its pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub generation: u64,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub logical_width: f64,
    pub logical_height: f64,
}
