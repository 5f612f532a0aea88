//! rollcall-core — the attendance engine.
//!
//! Loads a gallery of named reference faces, runs the live
//! detect/match/annotate loop against an injected vision backend, and
//! appends one timestamped ledger record the first time each known
//! person is seen in a session.
//!
//! The vision capability (SCRFD detection + ArcFace encoding via ONNX
//! Runtime) sits behind the [`FaceVision`] trait so every workflow in
//! this crate can run headlessly against a stub backend.

pub mod alignment;
pub mod capture;
pub mod detector;
pub mod encoder;
pub mod frame;
pub mod gallery;
pub mod ledger;
pub mod matching;
pub mod onnx;
pub mod session;
pub mod source;
pub mod surface;
pub mod types;
pub mod vision;

pub use capture::{CaptureError, CaptureIntake, CaptureOutcome};
pub use detector::DEFAULT_DETECTION_THRESHOLD;
pub use frame::Frame;
pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use ledger::{AttendanceLedger, LedgerError};
pub use matching::{MatchDecision, DEFAULT_TOLERANCE, UNKNOWN_LABEL};
pub use onnx::OnnxVision;
pub use session::{RecognitionSession, SessionError, SessionSummary, DEFAULT_DOWNSCALE};
pub use source::{SourceError, VideoSource};
pub use surface::{ControlSignal, FaceOverlay, Surface};
pub use types::{BoundingBox, Encoding};
pub use vision::{FaceVision, VisionError};
