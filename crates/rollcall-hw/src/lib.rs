//! rollcall-hw — webcam capture and terminal preview.
//!
//! Provides V4L2-based camera access behind the engine's `VideoSource`
//! trait and an ASCII terminal renderer behind its `Surface` trait.

pub mod camera;
pub mod convert;
pub mod preview;

pub use camera::{Camera, CameraError, DeviceInfo, DEFAULT_DEVICE};
pub use preview::TerminalSurface;
