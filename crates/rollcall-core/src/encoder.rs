//! ArcFace embedding encoder via ONNX Runtime.
//!
//! Aligns each detected face to a canonical 112×112 crop using its five
//! landmarks, then runs the ArcFace recognition model to produce an
//! L2-normalized 512-dimensional encoding.

use crate::alignment::{align_face, ALIGNED_SIZE};
use crate::frame::Frame;
use crate::types::{BoundingBox, Encoding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("recognition model not found at {0} (expected w600k_r50.onnx in the model directory)")]
    ModelNotFound(String),
    #[error("detection has no landmarks, cannot align face for encoding")]
    MissingLandmarks,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the ArcFace ONNX model.
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Encode one detected face into a 512-dimensional embedding.
    ///
    /// The detection must carry landmarks; boxes produced by the SCRFD
    /// detector always do.
    pub fn encode(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Encoding, EncoderError> {
        let landmarks = face.landmarks.ok_or(EncoderError::MissingLandmarks)?;

        let aligned = align_face(frame, &landmarks);
        let input = preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, embedding) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding: {e}")))?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                embedding.len()
            )));
        }

        Ok(Encoding::new(l2_normalize(embedding)))
    }
}

/// Convert an aligned 112×112 RGB crop into the ArcFace input tensor.
///
/// ArcFace expects NCHW float input in RGB channel order normalized to
/// roughly [-1, 1].
fn preprocess(aligned: &[u8]) -> Array4<f32> {
    let size = ALIGNED_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (aligned[idx + c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }

    tensor
}

/// Normalize a vector to unit length. Zero vectors come back unchanged.
fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| v / norm).collect()
    } else {
        values.to_vec()
    }
}
