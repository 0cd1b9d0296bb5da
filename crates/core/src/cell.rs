//! The page render cell: props in, one live surface out.

use crate::config::CellConfig;
use crate::container::DisplayContainer;
use crate::decision::{needs_render, RenderKey};
use crate::error::Result;
use crate::overlay::{AnnotationClick, AnnotationOverlay, NoOverlay};
use crate::page_source::SharedPage;
use crate::scheduler::{PendingRender, RenderScheduler};
use crate::surface::SurfaceInfo;
use std::fmt;
use tracing::debug;

/// Props supplied by the hosting viewer.
#[derive(Clone)]
pub struct CellProps {
    pub page: SharedPage,
    pub scale: f64,
    /// Forwarded to the annotation overlay, never called by the cell.
    pub on_annotation_click: AnnotationClick,
}

impl CellProps {
    pub fn new(page: SharedPage, scale: f64, on_annotation_click: AnnotationClick) -> Self {
        Self {
            page,
            scale,
            on_annotation_click,
        }
    }

    pub fn render_key(&self) -> RenderKey {
        RenderKey::of(self.page.as_ref(), self.scale)
    }
}

impl fmt::Debug for CellProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellProps")
            .field("page_version", &self.page.version())
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

/// Observable state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Nothing rendered and nothing in flight.
    Idle,
    /// At least one render is in flight.
    Rendering,
    /// A surface is live and nothing is in flight.
    Live,
    /// The cell was unmounted.
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Mounted,
    Unmounted,
}

/// Renders one page into its display container and keeps the annotation
/// overlay in step with the same props.
pub struct PageRenderCell<O = NoOverlay> {
    scheduler: RenderScheduler,
    overlay: O,
    props: CellProps,
    lifecycle: Lifecycle,
}

impl PageRenderCell<NoOverlay> {
    /// Create a cell without an annotation overlay.
    pub fn new(config: CellConfig, props: CellProps) -> Result<Self> {
        Self::with_overlay(config, props, NoOverlay)
    }
}

impl<O: AnnotationOverlay> PageRenderCell<O> {
    /// Create a cell that forwards its props to `overlay`.
    pub fn with_overlay(config: CellConfig, props: CellProps, overlay: O) -> Result<Self> {
        Ok(Self {
            scheduler: RenderScheduler::new(&config)?,
            overlay,
            props,
            lifecycle: Lifecycle::Created,
        })
    }

    /// Mount the cell and issue its first render.
    ///
    /// Returns None if the cell was already mounted or has been unmounted.
    pub fn mount(&mut self) -> Option<PendingRender> {
        if self.lifecycle != Lifecycle::Created {
            debug!("Ignoring mount of a cell in state {:?}", self.lifecycle);
            return None;
        }
        self.lifecycle = Lifecycle::Mounted;
        debug!("Mounting cell with {:?}", self.props);

        self.sync_overlay();
        Some(
            self.scheduler
                .schedule_render(self.props.page.clone(), self.props.scale),
        )
    }

    /// Deliver new props. Returns the render issued for them, if one was needed.
    pub fn receive_props(&mut self, next: CellProps) -> Option<PendingRender> {
        match self.lifecycle {
            Lifecycle::Unmounted => {
                debug!("Ignoring props for unmounted cell: {:?}", next);
                None
            }
            Lifecycle::Created => {
                self.props = next;
                None
            }
            Lifecycle::Mounted => {
                let render = needs_render(&self.props.render_key(), &next.render_key());
                self.props = next;
                self.sync_overlay();

                if render {
                    Some(
                        self.scheduler
                            .schedule_render(self.props.page.clone(), self.props.scale),
                    )
                } else {
                    None
                }
            }
        }
    }

    /// Unmount the cell. Renders still in flight will be discarded.
    pub fn unmount(&mut self) {
        if self.lifecycle == Lifecycle::Unmounted {
            return;
        }
        self.lifecycle = Lifecycle::Unmounted;
        self.scheduler.shutdown();
        self.overlay.unmount();
        debug!("Unmounted cell");
    }

    fn sync_overlay(&mut self) {
        self.overlay.update(
            &self.props.page,
            self.props.scale,
            &self.props.on_annotation_click,
        );
    }

    pub fn state(&self) -> CellState {
        if self.lifecycle == Lifecycle::Unmounted {
            CellState::Unmounted
        } else if self.scheduler.in_flight() > 0 {
            CellState::Rendering
        } else if self.scheduler.container().child_count() > 0 {
            CellState::Live
        } else {
            CellState::Idle
        }
    }

    /// Metadata of the surface currently shown.
    pub fn live_surface(&self) -> Option<SurfaceInfo> {
        self.scheduler.container().live()
    }

    pub fn container(&self) -> &DisplayContainer {
        self.scheduler.container()
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn props(&self) -> &CellProps {
        &self.props
    }

    pub fn overlay(&self) -> &O {
        &self.overlay
    }
}

impl<O> fmt::Debug for PageRenderCell<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRenderCell")
            .field("scheduler", &self.scheduler)
            .field("props", &self.props)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::overlay::click_handler;
    use crate::page_source::{PageHandle, Viewport};
    use crate::scheduler::RenderOutcome;
    use crate::surface::Surface;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct BlankPage {
        version: u64,
        renders: AtomicUsize,
    }

    impl BlankPage {
        fn new(version: u64) -> Arc<Self> {
            Arc::new(Self {
                version,
                renders: AtomicUsize::new(0),
            })
        }
    }

    impl PageHandle for BlankPage {
        fn version(&self) -> u64 {
            self.version
        }

        fn viewport(&self, resolution: f64) -> Viewport {
            Viewport::from_points(200.0, 100.0, resolution)
        }

        fn render_into<'a>(
            &'a self,
            _surface: &'a mut Surface,
            _viewport: &'a Viewport,
        ) -> BoxFuture<'a, crate::error::Result<()>> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        }
    }

    #[derive(Default)]
    struct CountingOverlay {
        updates: Vec<(u64, f64)>,
        unmounted: bool,
    }

    impl AnnotationOverlay for CountingOverlay {
        fn update(&mut self, page: &SharedPage, scale: f64, _on_click: &AnnotationClick) {
            self.updates.push((page.version(), scale));
        }

        fn unmount(&mut self) {
            self.unmounted = true;
        }
    }

    fn props(page: Arc<BlankPage>, scale: f64) -> CellProps {
        CellProps::new(page, scale, click_handler(|_| {}))
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = PageRenderCell::new(
            CellConfig::with_device_pixel_ratio(-1.0),
            props(BlankPage::new(1), 1.0),
        );
        assert!(matches!(result, Err(RenderError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_mount_renders_once() {
        let page = BlankPage::new(1);
        let mut cell = PageRenderCell::new(CellConfig::default(), props(page.clone(), 1.0)).unwrap();
        assert_eq!(cell.state(), CellState::Idle);

        let pending = cell.mount().expect("first mount renders");
        assert_eq!(cell.state(), CellState::Rendering);
        assert!(matches!(pending.await, RenderOutcome::Displayed(_)));
        assert_eq!(cell.state(), CellState::Live);

        assert!(cell.mount().is_none());
        assert_eq!(page.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_props_before_mount_are_kept_for_mount() {
        let mut cell =
            PageRenderCell::new(CellConfig::default(), props(BlankPage::new(1), 1.0)).unwrap();
        assert!(cell.receive_props(props(BlankPage::new(1), 2.0)).is_none());

        let pending = cell.mount().unwrap();
        assert_eq!(pending.request().unwrap().scale, 2.0);
    }

    #[test]
    fn test_overlay_follows_every_delivery() {
        let page = BlankPage::new(1);
        let mut cell = PageRenderCell::with_overlay(
            CellConfig::default(),
            props(page.clone(), 1.0),
            CountingOverlay::default(),
        )
        .unwrap();

        let _first = cell.mount();
        let none = cell.receive_props(props(page.clone(), 1.0));
        assert!(none.is_none());
        let _second = cell.receive_props(props(BlankPage::new(2), 1.0));

        assert_eq!(cell.overlay().updates, vec![(1, 1.0), (1, 1.0), (2, 1.0)]);

        cell.unmount();
        assert!(cell.overlay().unmounted);
    }

    #[tokio::test]
    async fn test_unmounted_cell_ignores_props() {
        let mut cell =
            PageRenderCell::new(CellConfig::default(), props(BlankPage::new(1), 1.0)).unwrap();
        let pending = cell.mount().unwrap();
        cell.unmount();

        assert_eq!(pending.await, RenderOutcome::Discarded);
        assert!(cell.receive_props(props(BlankPage::new(2), 3.0)).is_none());
        assert_eq!(cell.state(), CellState::Unmounted);
        assert!(cell.live_surface().is_none());
        assert!(cell.mount().is_none());
    }
}
