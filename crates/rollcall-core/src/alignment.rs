//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face into the canonical 112×112 ArcFace crop using the
//! five InsightFace reference landmarks and a least-squares fit.

use crate::frame::Frame;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub(crate) const ALIGNED_SIZE: usize = 112;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
///
/// Scale and rotation live in `(a, b)`; no shear, no reflection.
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    const IDENTITY: Similarity = Similarity {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares fit mapping `src` points onto `dst`.
    ///
    /// Choosing the translation so the centroids coincide decouples the
    /// normal equations, leaving the closed form `a = Σ(p·q) / Σ|p|²` and
    /// `b = Σ(p×q) / Σ|p|²` over the centered point pairs.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
        let n = src.len() as f32;
        let (mut mx, mut my) = (0.0f32, 0.0f32);
        let (mut ux, mut uy) = (0.0f32, 0.0f32);
        for (s, d) in src.iter().zip(dst) {
            mx += s.0;
            my += s.1;
            ux += d.0;
            uy += d.1;
        }
        mx /= n;
        my /= n;
        ux /= n;
        uy /= n;

        let mut norm = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (s, d) in src.iter().zip(dst) {
            let (px, py) = (s.0 - mx, s.1 - my);
            let (qx, qy) = (d.0 - ux, d.1 - uy);
            norm += px * px + py * py;
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
        }

        if norm < 1e-12 {
            // All source landmarks coincide; nothing to fit.
            return Similarity::IDENTITY;
        }

        let a = dot / norm;
        let b = cross / norm;
        Similarity {
            a,
            b,
            tx: ux - a * mx + b * my,
            ty: uy - b * mx - a * my,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse transform, or `None` when the scale collapses to zero.
    fn inverse(&self) -> Option<Similarity> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Similarity {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Warp the source frame through `transform` into a square RGB crop.
///
/// Each output pixel is mapped back into the source and sampled bilinearly.
/// Out-of-bounds samples are black.
fn warp_crop(frame: &Frame, transform: &Similarity, out_size: usize) -> Vec<u8> {
    let mut output = vec![0u8; out_size * out_size * 3];
    let Some(back) = transform.inverse() else {
        return output;
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = back.apply(ox as f32, oy as f32);
            let rgb = sample_bilinear(frame, sx, sy);
            let at = (oy * out_size + ox) * 3;
            output[at..at + 3].copy_from_slice(&rgb);
        }
    }

    output
}

/// Bilinear interpolation of all three channels at a fractional position.
fn sample_bilinear(frame: &Frame, sx: f32, sy: f32) -> [u8; 3] {
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let tap = |x: i64, y: i64| -> [f32; 3] {
        if x < 0 || y < 0 || x >= i64::from(frame.width) || y >= i64::from(frame.height) {
            return [0.0; 3];
        }
        let at = (y as usize * frame.width as usize + x as usize) * 3;
        [
            frame.data[at] as f32,
            frame.data[at + 1] as f32,
            frame.data[at + 2] as f32,
        ]
    };

    let (tl, tr) = (tap(x0, y0), tap(x0 + 1, y0));
    let (bl, br) = (tap(x0, y0 + 1), tap(x0 + 1, y0 + 1));

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Align a detected face to the canonical 112×112 RGB crop.
///
/// Computes the similarity transform from the detected landmarks to the
/// reference positions and warps the face region into an aligned output
/// suitable for embedding extraction.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = Similarity::fit(landmarks, &REFERENCE_LANDMARKS_112);
    warp_crop(frame, &transform, ALIGNED_SIZE)
}
