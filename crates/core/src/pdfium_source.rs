//! Page source backed by pdfium (Google's PDF engine).
//!
//! Pdfium documents borrow the library instance and are not safe to share
//! across threads, so each [`PdfiumDocument`] owns a dedicated worker thread
//! that binds the library, keeps the document open and serves render jobs:
//! - Jobs arrive over a crossbeam channel
//! - Bitmaps go back over tokio oneshot channels
//! - Background compositing is parallelized with rayon

use crate::config::PdfiumConfig;
use crate::error::{RenderError, Result};
use crate::page_source::{PageHandle, Viewport};
use crate::surface::Surface;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use pdfium_render::prelude::*;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Size of a page in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_points: f32,
    pub height_points: f32,
}

enum Job {
    Render {
        page_index: u16,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<RgbaImage>>,
    },
    Reload {
        reply: oneshot::Sender<Result<Vec<PageSize>>>,
    },
    Shutdown,
}

struct DocumentShared {
    path: PathBuf,
    jobs: Sender<Job>,
    version: AtomicU64,
    pages: Mutex<Vec<PageSize>>,
}

impl DocumentShared {
    fn pages(&self) -> std::sync::MutexGuard<'_, Vec<PageSize>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queues a shutdown behind any pending jobs and returns without waiting, so
/// the last handle can be dropped on an async runtime thread.
impl Drop for DocumentShared {
    fn drop(&mut self) {
        if self.jobs.send(Job::Shutdown).is_err() {
            debug!("Pdfium worker for {:?} already gone", self.path);
        }
    }
}

/// An open PDF document served by a pdfium worker thread.
#[derive(Clone)]
pub struct PdfiumDocument {
    shared: Arc<DocumentShared>,
}

impl PdfiumDocument {
    /// Bind pdfium and open the document at `path`.
    ///
    /// Blocks until the worker has loaded the document.
    pub fn open(path: impl Into<PathBuf>, config: PdfiumConfig) -> Result<Self> {
        config.validate()?;
        let path = path.into();

        let (jobs_tx, jobs_rx) = unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let worker_path = path.clone();
        let worker = std::thread::Builder::new()
            .name("pdfium-worker".to_string())
            .spawn(move || run_worker(worker_path, config, jobs_rx, ready_tx))
            .map_err(|e| RenderError::PdfiumError(format!("Failed to start worker: {}", e)))?;

        let pages = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(RenderError::WorkerShutdown),
        };
        let pages = match pages {
            Ok(pages) => pages,
            Err(e) => {
                let _ = worker.join();
                return Err(e);
            }
        };

        info!("Opened {:?} with {} pages", path, pages.len());
        // Detached: the worker exits on its own once it reads Shutdown.
        drop(worker);

        Ok(Self {
            shared: Arc::new(DocumentShared {
                path,
                jobs: jobs_tx,
                version: AtomicU64::new(1),
                pages: Mutex::new(pages),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Current content version; increases on every successful reload.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    pub fn page_count(&self) -> usize {
        self.shared.pages().len()
    }

    /// Handle to page `index` (0-based) at the current version.
    pub fn page(&self, index: usize) -> Result<PdfiumPage> {
        let pages = self.shared.pages();
        let size = *pages.get(index).ok_or(RenderError::PageOutOfRange {
            index,
            page_count: pages.len(),
        })?;
        let page_index = u16::try_from(index).map_err(|_| RenderError::PageOutOfRange {
            index,
            page_count: pages.len(),
        })?;

        Ok(PdfiumPage {
            document: Arc::clone(&self.shared),
            index: page_index,
            size,
            version: self.version(),
        })
    }

    /// Re-parse the document from disk and bump its version.
    ///
    /// Page handles obtained earlier keep their old version.
    pub async fn reload(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.shared.jobs.send(Job::Reload { reply })?;
        let pages = rx.await??;

        *self.shared.pages() = pages;
        let version = self.shared.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Reloaded {:?}, now at version {}", self.shared.path, version);
        Ok(version)
    }
}

impl std::fmt::Debug for PdfiumDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumDocument")
            .field("path", &self.shared.path)
            .field("version", &self.version())
            .field("page_count", &self.page_count())
            .finish()
    }
}

/// One page of a [`PdfiumDocument`].
#[derive(Clone)]
pub struct PdfiumPage {
    document: Arc<DocumentShared>,
    index: u16,
    size: PageSize,
    version: u64,
}

impl PdfiumPage {
    /// Page index (0-based).
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn size(&self) -> PageSize {
        self.size
    }
}

impl std::fmt::Debug for PdfiumPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumPage")
            .field("index", &self.index)
            .field("size", &self.size)
            .field("version", &self.version)
            .finish()
    }
}

impl PageHandle for PdfiumPage {
    fn version(&self) -> u64 {
        self.version
    }

    fn viewport(&self, resolution: f64) -> Viewport {
        Viewport::from_points(
            self.size.width_points as f64,
            self.size.height_points as f64,
            resolution,
        )
    }

    fn render_into<'a>(
        &'a self,
        surface: &'a mut Surface,
        _viewport: &'a Viewport,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let (reply, rx) = oneshot::channel();
            self.document.jobs.send(Job::Render {
                page_index: self.index,
                width: surface.pixel_width(),
                height: surface.pixel_height(),
                reply,
            })?;
            let image = rx.await??;
            surface.blit(&image);
            Ok::<(), RenderError>(())
        }
        .boxed()
    }
}

/// Bind to the pdfium library, trying the configured directory first.
fn bind_pdfium(config: &PdfiumConfig) -> Result<Pdfium> {
    let bindings = match &config.library_path {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib"))
            })
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                    "/usr/local/lib",
                ))
            })
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| RenderError::PdfiumError(format!("Failed to load pdfium library: {}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn load_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<(PdfDocument<'a>, Vec<PageSize>)> {
    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| RenderError::DocumentLoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    let page_count = document.pages().len() as usize;
    let mut sizes = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let page = document.pages().get(index as u16).map_err(|e| {
            RenderError::PdfiumError(format!("Failed to get page {}: {}", index + 1, e))
        })?;
        sizes.push(PageSize {
            width_points: page.width().value,
            height_points: page.height().value,
        });
    }

    Ok((document, sizes))
}

fn run_worker(
    path: PathBuf,
    config: PdfiumConfig,
    jobs: Receiver<Job>,
    ready: Sender<Result<Vec<PageSize>>>,
) {
    let pdfium = match bind_pdfium(&config) {
        Ok(pdfium) => pdfium,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let thread_pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(config.render_threads)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            let _ = ready.send(Err(RenderError::InvalidConfig(format!(
                "Failed to create thread pool: {}",
                e
            ))));
            return;
        }
    };

    let mut document = match load_document(&pdfium, &path) {
        Ok((document, sizes)) => {
            if ready.send(Ok(sizes)).is_err() {
                return;
            }
            document
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    debug!(
        "Pdfium worker serving {:?} with {} compositing threads",
        path, config.render_threads
    );

    while let Ok(job) = jobs.recv() {
        match job {
            Job::Render {
                page_index,
                width,
                height,
                reply,
            } => {
                let start = Instant::now();
                let result =
                    render_page(&document, page_index, width, height, &config, &thread_pool);
                if let Err(e) = &result {
                    warn!("Pdfium failed on page {}: {}", page_index + 1, e);
                } else {
                    debug!(
                        "Rendered page {} at {}x{} in {:?}",
                        page_index + 1,
                        width,
                        height,
                        start.elapsed()
                    );
                }
                // The requester may have given up; nothing to do then.
                let _ = reply.send(result);
            }
            Job::Reload { reply } => match load_document(&pdfium, &path) {
                Ok((reloaded, sizes)) => {
                    document = reloaded;
                    let _ = reply.send(Ok(sizes));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Job::Shutdown => break,
        }
    }

    debug!("Pdfium worker for {:?} exiting", path);
}

fn render_page(
    document: &PdfDocument,
    page_index: u16,
    width: u32,
    height: u32,
    config: &PdfiumConfig,
    thread_pool: &rayon::ThreadPool,
) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Ok(RgbaImage::new(width, height));
    }

    let page = document.pages().get(page_index).map_err(|e| {
        RenderError::rasterization(format!("Failed to get page {}: {}", page_index + 1, e))
    })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_target_height(height as i32)
        .rotate_if_landscape(PdfPageRenderRotation::None, false);

    let bitmap = page.render_with_config(&render_config).map_err(|e| {
        RenderError::rasterization(format!("Failed to render page {}: {}", page_index + 1, e))
    })?;

    let mut image: RgbaImage = bitmap.as_image().into_rgba8();

    if !config.use_alpha {
        let raw: &mut [u8] = &mut image;
        thread_pool.install(|| composite_over_background(raw, config.background_color));
    }

    Ok(image)
}

/// Blend RGBA pixels over an opaque background color in place.
pub fn composite_over_background(raw: &mut [u8], background: (u8, u8, u8)) {
    let (r, g, b) = background;
    raw.par_chunks_exact_mut(4).for_each(|pixel| {
        let alpha = pixel[3] as f32 / 255.0;
        if alpha < 1.0 {
            let inv_alpha = 1.0 - alpha;
            pixel[0] = ((pixel[0] as f32 * alpha) + (r as f32 * inv_alpha)) as u8;
            pixel[1] = ((pixel[1] as f32 * alpha) + (g as f32 * inv_alpha)) as u8;
            pixel[2] = ((pixel[2] as f32 * alpha) + (b as f32 * inv_alpha)) as u8;
            pixel[3] = 255;
        }
    });
}
