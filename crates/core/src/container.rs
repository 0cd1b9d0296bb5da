//! The cell's display container.
//!
//! The container owns at most one child [`Surface`] and only changes by
//! replacing that child in a single step. After [`DisplayContainer::detach`]
//! it refuses every further write, so a render that lands after the cell is
//! gone has nothing to dangle from.

use crate::surface::{Surface, SurfaceId, SurfaceInfo};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One observable change of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMutation {
    /// `attached` became the child, `removed` (if any) left in the same step.
    Replaced {
        removed: Option<SurfaceId>,
        attached: SurfaceId,
    },
    /// The container was detached from its cell.
    Detached { removed: Option<SurfaceId> },
}

/// Synchronous observer of container mutations.
///
/// Called while the container is locked; implementations must not call back
/// into the container.
pub trait ContainerObserver: Send + Sync {
    /// `child_count` is the number of children right after `mutation`.
    fn on_mutation(&self, mutation: &ContainerMutation, child_count: usize);
}

/// Result of offering a surface to the container.
#[derive(Debug)]
pub enum Commit {
    /// The surface is now live; `replaced` is the previous child.
    Attached { replaced: Option<Surface> },
    /// The offer lost to a newer request; the surface is handed back.
    Stale(Surface),
    /// The container is detached; the surface is handed back.
    Detached(Surface),
}

struct ContainerState {
    live: Option<Surface>,
    attached: bool,
    observers: Vec<Arc<dyn ContainerObserver>>,
}

impl ContainerState {
    fn child_count(&self) -> usize {
        usize::from(self.live.is_some())
    }

    fn notify(&self, mutation: ContainerMutation) {
        let child_count = self.child_count();
        for observer in &self.observers {
            observer.on_mutation(&mutation, child_count);
        }
    }
}

/// Handle to a cell's display container. Clones share the same container.
#[derive(Clone)]
pub struct DisplayContainer {
    state: Arc<Mutex<ContainerState>>,
}

impl Default for DisplayContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayContainer {
    /// Create an empty, attached container.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ContainerState {
                live: None,
                attached: true,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for subsequent mutations.
    pub fn add_observer(&self, observer: Arc<dyn ContainerObserver>) {
        self.lock().observers.push(observer);
    }

    /// Make `surface` the sole child if `is_current` still holds.
    ///
    /// `is_current` is evaluated under the container lock, so the check and
    /// the swap form one step with respect to every other commit.
    pub fn replace_if(&self, surface: Surface, is_current: impl FnOnce() -> bool) -> Commit {
        let mut state = self.lock();
        if !state.attached {
            return Commit::Detached(surface);
        }
        if !is_current() {
            return Commit::Stale(surface);
        }

        let attached = surface.id();
        let replaced = state.live.replace(surface);
        state.notify(ContainerMutation::Replaced {
            removed: replaced.as_ref().map(Surface::id),
            attached,
        });
        Commit::Attached { replaced }
    }

    /// Detach the container and hand back its child. Idempotent.
    pub fn detach(&self) -> Option<Surface> {
        let mut state = self.lock();
        if !state.attached {
            return None;
        }
        state.attached = false;
        let removed = state.live.take();
        state.notify(ContainerMutation::Detached {
            removed: removed.as_ref().map(Surface::id),
        });
        removed
    }

    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Number of children: 0 before the first render lands, 1 afterwards.
    pub fn child_count(&self) -> usize {
        self.lock().child_count()
    }

    /// Metadata of the live surface.
    pub fn live(&self) -> Option<SurfaceInfo> {
        self.lock().live.as_ref().map(Surface::info)
    }

    /// Run `f` against the live surface.
    pub fn with_live<R>(&self, f: impl FnOnce(&Surface) -> R) -> Option<R> {
        self.lock().live.as_ref().map(f)
    }
}

impl fmt::Debug for DisplayContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DisplayContainer")
            .field("live", &state.live)
            .field("attached", &state.attached)
            .field("observers", &state.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_SURFACE_PIXELS;
    use crate::page_source::Viewport;

    fn surface(generation: u64) -> Surface {
        let viewport = Viewport::from_points(10.0, 20.0, 1.0);
        Surface::allocate(&viewport, 1.0, DEFAULT_MAX_SURFACE_PIXELS)
            .unwrap()
            .with_generation(generation)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(ContainerMutation, usize)>>,
    }

    impl ContainerObserver for Recorder {
        fn on_mutation(&self, mutation: &ContainerMutation, child_count: usize) {
            self.events.lock().unwrap().push((*mutation, child_count));
        }
    }

    #[test]
    fn test_new_container_is_empty_and_attached() {
        let container = DisplayContainer::new();
        assert!(container.is_attached());
        assert_eq!(container.child_count(), 0);
        assert!(container.live().is_none());
    }

    #[test]
    fn test_replace_keeps_exactly_one_child() {
        let container = DisplayContainer::new();
        let first = surface(1);
        let first_id = first.id();

        match container.replace_if(first, || true) {
            Commit::Attached { replaced } => assert!(replaced.is_none()),
            other => panic!("Expected Attached, got {:?}", other),
        }

        let second = surface(2);
        let second_id = second.id();
        match container.replace_if(second, || true) {
            Commit::Attached { replaced } => {
                assert_eq!(replaced.map(|s| s.id()), Some(first_id));
            }
            other => panic!("Expected Attached, got {:?}", other),
        }

        assert_eq!(container.child_count(), 1);
        assert_eq!(container.live().map(|info| info.id), Some(second_id));
    }

    #[test]
    fn test_stale_offer_leaves_container_untouched() {
        let container = DisplayContainer::new();
        let recorder = Arc::new(Recorder::default());
        container.add_observer(recorder.clone());

        let live = surface(2);
        let live_id = live.id();
        container.replace_if(live, || true);

        match container.replace_if(surface(1), || false) {
            Commit::Stale(returned) => assert_eq!(returned.generation(), 1),
            other => panic!("Expected Stale, got {:?}", other),
        }

        assert_eq!(container.live().map(|info| info.id), Some(live_id));
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_swap_is_a_single_mutation() {
        let container = DisplayContainer::new();
        let recorder = Arc::new(Recorder::default());
        container.add_observer(recorder.clone());

        let a = surface(1);
        let a_id = a.id();
        let b = surface(2);
        let b_id = b.id();
        container.replace_if(a, || true);
        container.replace_if(b, || true);

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (
                    ContainerMutation::Replaced {
                        removed: None,
                        attached: a_id
                    },
                    1
                ),
                (
                    ContainerMutation::Replaced {
                        removed: Some(a_id),
                        attached: b_id
                    },
                    1
                ),
            ]
        );
    }

    #[test]
    fn test_detach_refuses_later_commits() {
        let container = DisplayContainer::new();
        let live = surface(1);
        let live_id = live.id();
        container.replace_if(live, || true);

        let removed = container.detach();
        assert_eq!(removed.map(|s| s.id()), Some(live_id));
        assert!(!container.is_attached());
        assert!(container.detach().is_none());

        match container.replace_if(surface(2), || true) {
            Commit::Detached(_) => (),
            other => panic!("Expected Detached, got {:?}", other),
        }
        assert_eq!(container.child_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let container = DisplayContainer::new();
        let clone = container.clone();
        clone.replace_if(surface(1), || true);
        assert_eq!(container.child_count(), 1);
        assert_eq!(container.with_live(|s| s.pixel_width()), Some(10));
    }
}
