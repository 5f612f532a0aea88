//! Video source abstraction.

use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),
    #[error("video source has no more frames")]
    EndOfStream,
}

/// Anything that can hand out RGB frames one at a time.
///
/// The camera implements this for live capture; tests drive sessions with
/// scripted sources instead.
pub trait VideoSource {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;
}
