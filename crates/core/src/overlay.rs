//! Annotation overlay seam.
//!
//! The overlay paints interactive regions over the page at the same scale
//! and reports clicks through the host's callback. The cell only forwards
//! props to it.

use crate::page_source::SharedPage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An annotation the user clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTarget {
    /// Annotation subtype, e.g. "Link".
    pub subtype: String,
    /// Bounds in page points: left, bottom, right, top.
    pub rect: [f64; 4],
    /// External URL for link annotations.
    pub url: Option<String>,
    /// Named destination inside the document.
    pub dest: Option<String>,
}

/// Host callback for annotation clicks.
pub type AnnotationClick = Arc<dyn Fn(&AnnotationTarget) + Send + Sync>;

/// Wrap a closure as an [`AnnotationClick`].
pub fn click_handler(f: impl Fn(&AnnotationTarget) + Send + Sync + 'static) -> AnnotationClick {
    Arc::new(f)
}

/// Overlay drawn above the page surface.
pub trait AnnotationOverlay {
    /// Receive the cell's current props.
    fn update(&mut self, page: &SharedPage, scale: f64, on_click: &AnnotationClick);

    /// The cell was unmounted.
    fn unmount(&mut self) {}
}

/// Overlay that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl AnnotationOverlay for NoOverlay {
    fn update(&mut self, _page: &SharedPage, _scale: f64, _on_click: &AnnotationClick) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_click_handler_invokes_closure() {
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&clicks);
        let handler = click_handler(move |target| {
            assert_eq!(target.subtype, "Link");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let target = AnnotationTarget {
            subtype: "Link".to_string(),
            rect: [72.0, 700.0, 144.0, 712.0],
            url: Some("https://example.com".to_string()),
            dest: None,
        };
        handler(&target);
        handler(&target);
        assert_eq!(clicks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_annotation_target_from_json() {
        let target: AnnotationTarget = serde_json::from_str(
            r#"{"subtype":"Link","rect":[0,0,10,10],"url":null,"dest":"chapter-2"}"#,
        )
        .unwrap();
        assert_eq!(target.dest.as_deref(), Some("chapter-2"));
        assert!(target.url.is_none());
    }
}
