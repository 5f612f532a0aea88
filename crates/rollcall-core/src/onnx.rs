//! ONNX Runtime vision backend.
//!
//! Bundles the SCRFD detector and ArcFace encoder behind the [`FaceVision`]
//! trait so the session and gallery code never touch ONNX directly.

use crate::detector::FaceDetector;
use crate::encoder::FaceEncoder;
use crate::frame::Frame;
use crate::types::{BoundingBox, Encoding};
use crate::vision::{FaceVision, VisionError};
use std::path::Path;

/// SCRFD 500M detection model filename.
pub const DETECTION_MODEL: &str = "det_500m.onnx";
/// ArcFace ResNet-50 recognition model filename.
pub const RECOGNITION_MODEL: &str = "w600k_r50.onnx";

/// Face detection and encoding backed by ONNX Runtime.
pub struct OnnxVision {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl OnnxVision {
    /// Load both models from `model_dir`.
    pub fn open(model_dir: &Path, detection_threshold: f32) -> Result<Self, VisionError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTION_MODEL), detection_threshold)?;
        let encoder = FaceEncoder::load(&model_dir.join(RECOGNITION_MODEL))?;
        tracing::info!(dir = %model_dir.display(), "vision backend ready");
        Ok(Self { detector, encoder })
    }
}

impl FaceVision for OnnxVision {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
        Ok(self.detector.detect(frame)?)
    }

    fn encode_faces(
        &mut self,
        frame: &Frame,
        faces: &[BoundingBox],
    ) -> Result<Vec<Encoding>, VisionError> {
        faces
            .iter()
            .map(|face| Ok(self.encoder.encode(frame, face)?))
            .collect()
    }

    /// Cosine distance. ArcFace embeddings are unit-length, so cosine
    /// similarity separates identities far better than raw Euclidean
    /// distance does. A distance at or below the default tolerance of 0.6
    /// corresponds to a cosine similarity of at least 0.40.
    fn distance(&self, a: &Encoding, b: &Encoding) -> f32 {
        1.0 - a.similarity(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_filenames_are_stable() {
        assert_eq!(DETECTION_MODEL, "det_500m.onnx");
        assert_eq!(RECOGNITION_MODEL, "w600k_r50.onnx");
    }
}
