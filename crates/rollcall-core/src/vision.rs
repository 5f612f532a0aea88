//! The injectable vision capability.
//!
//! Gallery loading and the recognition session only ever talk to a
//! [`FaceVision`] implementation, never to a concrete model runtime.
//! Production uses [`crate::OnnxVision`]; tests substitute stubs.

use crate::detector::DetectorError;
use crate::encoder::EncoderError;
use crate::frame::Frame;
use crate::types::{BoundingBox, Encoding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    /// Backend-specific failure that maps to neither model stage.
    #[error("vision backend: {0}")]
    Backend(String),
}

/// Face detection, encoding, and encoding distance.
pub trait FaceVision {
    /// Locate faces in a frame. An empty result is a valid outcome, not an
    /// error. Implementations return boxes ordered by descending confidence.
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError>;

    /// Compute one encoding per given face region, in the same order.
    fn encode_faces(
        &mut self,
        frame: &Frame,
        faces: &[BoundingBox],
    ) -> Result<Vec<Encoding>, VisionError>;

    /// Distance between two encodings; lower means more alike.
    ///
    /// Defaults to Euclidean distance. Backends producing L2-normalized
    /// embeddings override this with cosine distance.
    fn distance(&self, a: &Encoding, b: &Encoding) -> f32 {
        a.euclidean_distance(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullVision;

    impl FaceVision for NullVision {
        fn detect_faces(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
            Ok(Vec::new())
        }

        fn encode_faces(
            &mut self,
            _frame: &Frame,
            faces: &[BoundingBox],
        ) -> Result<Vec<Encoding>, VisionError> {
            Ok(faces.iter().map(|_| Encoding::new(vec![0.0])).collect())
        }
    }

    #[test]
    fn default_distance_is_euclidean() {
        let v = NullVision;
        let a = Encoding::new(vec![0.0, 0.0]);
        let b = Encoding::new(vec![3.0, 4.0]);
        assert!((v.distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn trait_is_object_safe() {
        let mut v: Box<dyn FaceVision> = Box::new(NullVision);
        let frame = Frame::solid(2, 2, [0, 0, 0]);
        assert!(v.detect_faces(&frame).unwrap().is_empty());
    }
}
