use std::sync::Arc;
use std::time::Duration;

use crate::slides::Slide;

/// Loader/CLI -> Rotation.
#[derive(Debug, Clone)]
pub enum RotationCommand {
    /// Rotate over `slides` with the given period. An empty sequence idles.
    Load {
        slides: Arc<[Slide]>,
        duration: Duration,
    },
    SetDuration(Duration),
    Stop,
}

/// Rotation -> Viewer: a new window has started on `slide`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowSlide {
    pub index: usize,
    pub slide: Slide,
}

/// Elapsed share of the current window, 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub index: usize,
    pub percent: f32,
}

/// Top-level display state published by the loader.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Loading,
    /// Terminal; carries the error detail shown under the message.
    Failed(String),
    /// Data loaded but there is nothing to show.
    Empty,
    Ready { slides: usize },
}

impl SessionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}
