//! Update decision: does a prop change need a new rasterization?

use crate::page_source::PageHandle;

/// The parts of the props that determine the rendered pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderKey {
    pub version: u64,
    pub scale: f64,
}

impl RenderKey {
    pub fn new(version: u64, scale: f64) -> Self {
        Self { version, scale }
    }

    /// Key of `page` shown at `scale`.
    pub fn of(page: &dyn PageHandle, scale: f64) -> Self {
        Self::new(page.version(), scale)
    }
}

/// Re-render iff the scale or the page content version changed.
///
/// Handle identity and the click callback are not part of the key.
pub fn needs_render(previous: &RenderKey, next: &RenderKey) -> bool {
    previous.scale != next.scale || previous.version != next.version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_needs_no_render() {
        let key = RenderKey::new(1, 1.5);
        assert!(!needs_render(&key, &RenderKey::new(1, 1.5)));
    }

    #[test]
    fn test_scale_change_needs_render() {
        assert!(needs_render(&RenderKey::new(1, 1.0), &RenderKey::new(1, 1.2)));
    }

    #[test]
    fn test_version_change_needs_render() {
        assert!(needs_render(&RenderKey::new(1, 1.0), &RenderKey::new(2, 1.0)));
    }

    #[test]
    fn test_version_going_back_still_needs_render() {
        assert!(needs_render(&RenderKey::new(3, 1.0), &RenderKey::new(2, 1.0)));
    }
}
