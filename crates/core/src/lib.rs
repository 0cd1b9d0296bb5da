//! # pagecell-core
//!
//! Single-page render cell for document viewers.
//!
//! A [`PageRenderCell`] shows one PDF page at a host-chosen zoom level:
//!
//! - **Update decision**: only a change of scale or page content version
//!   triggers rasterization
//! - **Staleness guard**: renders become visible in the order they were
//!   issued, whatever order they finish in
//! - **Replace-on-write container**: the visible surface is swapped in one
//!   step, so no empty frame is ever observable
//! - **Pdfium page source** running on its own worker thread
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagecell_core::{
//!     click_handler, CellConfig, CellProps, PageRenderCell, PdfiumConfig, PdfiumDocument,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let document = PdfiumDocument::open("paper.pdf", PdfiumConfig::default())?;
//!     let page = Arc::new(document.page(0)?);
//!
//!     let props = CellProps::new(page.clone(), 1.0, click_handler(|target| {
//!         println!("clicked {:?}", target);
//!     }));
//!     let mut cell = PageRenderCell::new(CellConfig::with_device_pixel_ratio(2.0), props)?;
//!
//!     if let Some(render) = cell.mount() {
//!         render.spawn();
//!     }
//!
//!     // Zoom in: a new render is issued and replaces the old surface when done.
//!     let zoomed = CellProps::new(page, 1.5, click_handler(|_| {}));
//!     if let Some(render) = cell.receive_props(zoomed) {
//!         println!("{:?}", render.await);
//!     }
//!
//!     println!("Live surface: {:?}", cell.live_surface());
//!     Ok(())
//! }
//! ```

pub mod cell;
pub mod config;
pub mod container;
pub mod decision;
pub mod error;
pub mod overlay;
pub mod page_source;
pub mod pdfium_source;
pub mod scheduler;
pub mod surface;

// Re-export main types for convenience
pub use cell::{CellProps, CellState, PageRenderCell};
pub use config::{CellConfig, PdfiumConfig, DEFAULT_MAX_SURFACE_PIXELS};
pub use container::{Commit, ContainerMutation, ContainerObserver, DisplayContainer};
pub use decision::{needs_render, RenderKey};
pub use error::{RenderError, Result};
pub use overlay::{click_handler, AnnotationClick, AnnotationOverlay, AnnotationTarget, NoOverlay};
pub use page_source::{effective_resolution, PageHandle, SharedPage, Viewport};
pub use pdfium_source::{PageSize, PdfiumDocument, PdfiumPage};
pub use scheduler::{PendingRender, RenderOutcome, RenderRequest, RenderScheduler};
pub use surface::{Surface, SurfaceId, SurfaceInfo};

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
