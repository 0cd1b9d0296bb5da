//! Render scheduler with a staleness guard.
//!
//! Every [`RenderScheduler::schedule_render`] call issues a new generation.
//! Rasterization runs asynchronously; when it completes, its surface is
//! offered to the display container and accepted only if its generation is
//! still the latest one issued. Visibility therefore follows issue order,
//! not completion order.
//!
//! By default superseded rasterizations run to completion and their result
//! is dropped. With [`CellConfig::abort_superseded`] the rasterization future
//! itself is dropped as soon as a newer request is issued.

use crate::config::CellConfig;
use crate::container::{Commit, DisplayContainer};
use crate::error::{RenderError, Result};
use crate::page_source::{effective_resolution, SharedPage, Viewport};
use crate::surface::{Surface, SurfaceInfo};
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// One rasterization attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Issue order within the scheduler, starting at 1.
    pub generation: u64,
    /// Content version of the page being rendered.
    pub page_version: u64,
    /// Zoom factor requested by the host.
    pub scale: f64,
    /// `scale * device_pixel_ratio`.
    pub effective_resolution: f64,
}

impl fmt::Display for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (page v{}, scale {}, resolution {})",
            self.generation, self.page_version, self.scale, self.effective_resolution
        )
    }
}

/// How a pending render ended.
///
/// Purely diagnostic: errors are logged by the scheduler and never carried here.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// The surface became the live child of the container.
    Displayed(SurfaceInfo),
    /// Rasterized, but a newer request was issued or the cell went away.
    Discarded,
    /// Superseded before rasterization finished; the rasterization was dropped.
    Aborted,
    /// Rasterization failed, or the surface could not be allocated; the live
    /// surface was left in place.
    Failed,
    /// Never issued (invalid scale).
    Rejected,
}

/// A scheduled render. Does nothing until awaited or [spawned](PendingRender::spawn).
#[must_use = "a pending render does nothing unless awaited or spawned"]
pub struct PendingRender {
    request: Option<RenderRequest>,
    inner: BoxFuture<'static, RenderOutcome>,
}

impl PendingRender {
    /// A render that ended before it was issued.
    fn unissued(outcome: RenderOutcome) -> Self {
        Self {
            request: None,
            inner: future::ready(outcome).boxed(),
        }
    }

    /// The request this render was issued as, None if it never was.
    pub fn request(&self) -> Option<&RenderRequest> {
        self.request.as_ref()
    }

    /// Drive the render on the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<RenderOutcome> {
        tokio::spawn(self)
    }
}

impl Future for PendingRender {
    type Output = RenderOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for PendingRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRender")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Counts a render as in flight for as long as it is alive.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Schedules renders into one display container.
pub struct RenderScheduler {
    device_pixel_ratio: f64,
    abort_superseded: bool,
    max_surface_pixels: u64,
    container: DisplayContainer,
    /// Latest issued generation.
    latest: watch::Sender<u64>,
    in_flight: Arc<AtomicUsize>,
}

impl RenderScheduler {
    /// Create a scheduler with a fresh display container.
    pub fn new(config: &CellConfig) -> Result<Self> {
        Self::with_container(config, DisplayContainer::new())
    }

    /// Create a scheduler rendering into `container`.
    pub fn with_container(config: &CellConfig, container: DisplayContainer) -> Result<Self> {
        config.validate()?;
        let (latest, _) = watch::channel(0);
        Ok(Self {
            device_pixel_ratio: config.device_pixel_ratio,
            abort_superseded: config.abort_superseded,
            max_surface_pixels: config.max_surface_pixels,
            container,
            latest,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn container(&self) -> &DisplayContainer {
        &self.container
    }

    /// Generation of the most recently issued request, 0 if none.
    pub fn latest_generation(&self) -> u64 {
        *self.latest.borrow()
    }

    /// Number of renders scheduled but not yet finished or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn issue(&self) -> u64 {
        let mut issued = 0;
        self.latest.send_modify(|generation| {
            *generation += 1;
            issued = *generation;
        });
        issued
    }

    /// Schedule a render of `page` at `scale`.
    ///
    /// The viewport is computed, the surface allocated and the request issued
    /// before this returns; only the rasterization is deferred to the
    /// returned future. Failures are logged, never returned.
    pub fn schedule_render(&self, page: SharedPage, scale: f64) -> PendingRender {
        if !scale.is_finite() || scale <= 0.0 {
            warn!(
                "Not rendering page v{}: {}",
                page.version(),
                RenderError::InvalidScale(scale)
            );
            return PendingRender::unissued(RenderOutcome::Rejected);
        }

        let resolution = effective_resolution(scale, self.device_pixel_ratio);
        let viewport = page.viewport(resolution);
        // Sized before issuing, so an oversized request never supersedes one in flight.
        let surface =
            match Surface::allocate(&viewport, self.device_pixel_ratio, self.max_surface_pixels) {
                Ok(surface) => surface,
                Err(e) => {
                    error!(
                        "Not rendering page v{} at scale {}: {}",
                        page.version(),
                        scale,
                        e
                    );
                    return PendingRender::unissued(RenderOutcome::Failed);
                }
            };

        let generation = self.issue();
        let surface = surface.with_generation(generation);
        let request = RenderRequest {
            generation,
            page_version: page.version(),
            scale,
            effective_resolution: resolution,
        };
        debug!(
            "Issued render {} into {}x{} surface",
            request,
            surface.pixel_width(),
            surface.pixel_height()
        );

        let task = RenderTask {
            request,
            page,
            viewport,
            surface,
            container: self.container.clone(),
            latest: self.latest.subscribe(),
            abort_superseded: self.abort_superseded,
            in_flight: InFlightGuard::new(Arc::clone(&self.in_flight)),
        };

        PendingRender {
            request: Some(request),
            inner: task.run().boxed(),
        }
    }

    /// Supersede every in-flight request and detach the container.
    pub fn shutdown(&self) {
        let generation = self.issue();
        if let Some(surface) = self.container.detach() {
            debug!("Detached {} at generation {}", surface.id(), generation);
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("abort_superseded", &self.abort_superseded)
            .field("latest_generation", &self.latest_generation())
            .field("in_flight", &self.in_flight())
            .field("container", &self.container)
            .finish()
    }
}

struct RenderTask {
    request: RenderRequest,
    page: SharedPage,
    viewport: Viewport,
    surface: Surface,
    container: DisplayContainer,
    latest: watch::Receiver<u64>,
    abort_superseded: bool,
    in_flight: InFlightGuard,
}

impl RenderTask {
    async fn run(self) -> RenderOutcome {
        let RenderTask {
            request,
            page,
            viewport,
            mut surface,
            container,
            latest,
            abort_superseded,
            in_flight: _in_flight,
        } = self;

        let rendered = if abort_superseded {
            tokio::select! {
                biased;
                _ = superseded(latest.clone(), request.generation) => None,
                result = page.render_into(&mut surface, &viewport) => Some(result),
            }
        } else {
            Some(page.render_into(&mut surface, &viewport).await)
        };

        match rendered {
            None => {
                debug!("Render {} superseded, rasterization dropped", request);
                RenderOutcome::Aborted
            }
            Some(Err(e)) => {
                error!("Error rendering page, request {}: {}", request, e);
                RenderOutcome::Failed
            }
            Some(Ok(())) => {
                let info = surface.info();
                let generation = request.generation;
                match container.replace_if(surface, || *latest.borrow() == generation) {
                    Commit::Attached { replaced } => {
                        debug!(
                            "Render {} now live as {}, replaced {:?}",
                            request,
                            info.id,
                            replaced.as_ref().map(Surface::id)
                        );
                        RenderOutcome::Displayed(info)
                    }
                    Commit::Stale(_) => {
                        debug!("Discarding stale render {}", request);
                        RenderOutcome::Discarded
                    }
                    Commit::Detached(_) => {
                        debug!("Discarding render {}, container detached", request);
                        RenderOutcome::Discarded
                    }
                }
            }
        }
    }
}

/// Resolves once a generation other than `generation` is issued, or the
/// scheduler is gone.
async fn superseded(mut latest: watch::Receiver<u64>, generation: u64) {
    loop {
        let current = *latest.borrow_and_update();
        if current != generation {
            return;
        }
        if latest.changed().await.is_err() {
            return;
        }
    }
}
