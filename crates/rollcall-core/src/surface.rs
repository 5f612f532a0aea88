//! Display surface abstraction.

use crate::frame::Frame;
use crate::types::BoundingBox;

/// User input collected from the surface between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Save the current frame (capture mode).
    Save,
    /// Stop the current loop.
    Quit,
}

/// A labelled box to draw over the frame, in full-frame coordinates.
#[derive(Debug, Clone)]
pub struct FaceOverlay {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Anything that can show frames and collect keypresses.
///
/// The terminal preview implements this; tests use scripted surfaces that
/// record what they were asked to present.
pub trait Surface {
    /// Show one frame with its overlays. Presentation failures are the
    /// surface's own problem and must not interrupt the caller.
    fn present(&mut self, frame: &Frame, overlays: &[FaceOverlay]);

    /// Drain one pending control keypress, if any. Never blocks.
    fn poll_control(&mut self) -> Option<ControlSignal>;
}
