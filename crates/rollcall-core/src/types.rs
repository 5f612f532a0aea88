use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Scale every coordinate by `factor`.
    ///
    /// Detection runs on a downscaled frame; multiplying by the downscale
    /// divisor maps a box back onto the full-resolution frame.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|pts| pts.map(|(x, y)| (x * factor, y * factor))),
        }
    }
}

/// Face encoding vector (512-dimensional for ArcFace backends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher means more similar. Zero when
    /// either vector has no magnitude.
    pub fn similarity(&self, other: &Encoding) -> f32 {
        let (dot, norm_a, norm_b) = self.values.iter().zip(&other.values).fold(
            (0.0f32, 0.0f32, 0.0f32),
            |(dot, na, nb), (a, b)| (dot + a * b, na + a * a, nb + b * b),
        );

        let denom = (norm_a * norm_b).sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between two encodings.
    pub fn euclidean_distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}
