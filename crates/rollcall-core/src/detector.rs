//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS
//! post-processing on RGB frames.

use crate::frame::Frame;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Confidence cutoff applied when no explicit threshold is configured.
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found at {0} (expected det_500m.onnx in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied by the letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    /// Map a point from letterboxed input space back into frame space.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Generic exports carry no tensor names, only the conventional order:
/// scores for strides 8/16/32, then bboxes, then kps.
const POSITIONAL_OUTPUT_INDICES: [StrideOutputIndices; 3] = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    confidence_threshold: f32,
    /// Which output tensor holds (score, bbox, kps) per stride, resolved
    /// once at load time.
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model, keeping detections at or above
    /// `confidence_threshold`.
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            confidence_threshold,
            stride_indices,
        })
    }

    /// Detect faces in an RGB frame, returning boxes sorted by descending
    /// confidence. Landmarks are populated for every returned box.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = self.preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&(score_idx, bbox_idx, kps_idx), &stride) in
            self.stride_indices.iter().zip(&SCRFD_STRIDES)
        {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| plane_error("scores", stride, e))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| plane_error("bboxes", stride, e))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| plane_error("kps", stride, e))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.input_width,
                self.input_height,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }

    /// Letterbox the RGB frame into a normalized NCHW float tensor.
    ///
    /// Every tensor cell inside the content region is mapped back to a
    /// fractional source position and sampled bilinearly; the padding
    /// region holds the mean, which normalizes to 0.0. Channels are
    /// written in BGR order, which is what the InsightFace SCRFD exports
    /// expect.
    fn preprocess(&self, frame: &Frame) -> (Array4<f32>, LetterboxInfo) {
        let fw = frame.width as usize;
        let fh = frame.height as usize;

        let scale =
            (self.input_width as f32 / fw as f32).min(self.input_height as f32 / fh as f32);
        let new_w = (fw as f32 * scale).round() as usize;
        let new_h = (fh as f32 * scale).round() as usize;
        let pad_x = (self.input_width - new_w) as f32 / 2.0;
        let pad_y = (self.input_height - new_h) as f32 / 2.0;

        let x_start = pad_x.floor() as usize;
        let y_start = pad_y.floor() as usize;
        let inv_scale = 1.0 / scale;

        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));

        for ty in 0..self.input_height {
            for tx in 0..self.input_width {
                let inside = (y_start..y_start + new_h).contains(&ty)
                    && (x_start..x_start + new_w).contains(&tx);
                let rgb = if inside {
                    let sx = ((tx - x_start) as f32 + 0.5) * inv_scale - 0.5;
                    let sy = ((ty - y_start) as f32 + 0.5) * inv_scale - 0.5;
                    resample_clamped(frame, sx, sy)
                } else {
                    [SCRFD_MEAN; 3]
                };

                tensor[[0, 0, ty, tx]] = (rgb[2] - SCRFD_MEAN) / SCRFD_STD;
                tensor[[0, 1, ty, tx]] = (rgb[1] - SCRFD_MEAN) / SCRFD_STD;
                tensor[[0, 2, ty, tx]] = (rgb[0] - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

fn plane_error(what: &str, stride: usize, e: ort::Error) -> DetectorError {
    DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
}

/// Bilinear sample of all three channels, clamping taps to the frame edge.
fn resample_clamped(frame: &Frame, sx: f32, sy: f32) -> [f32; 3] {
    let w = frame.width as usize;
    let h = frame.height as usize;

    let x0 = (sx.floor() as i32).clamp(0, w as i32 - 1) as usize;
    let y0 = (sy.floor() as i32).clamp(0, h as i32 - 1) as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (sx - sx.floor()).clamp(0.0, 1.0);
    let fy = (sy - sy.floor()).clamp(0.0, 1.0);

    let px = |x: usize, y: usize, c: usize| frame.data[(y * w + x) * 3 + c] as f32;

    let mut out = [0.0f32; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = px(x0, y0, c) * (1.0 - fx) + px(x1, y0, c) * fx;
        let bottom = px(x0, y1, c) * (1.0 - fx) + px(x1, y1, c) * fx;
        *slot = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Resolve which output tensor holds scores, bboxes and kps for each stride.
///
/// InsightFace exports either name their outputs per stride ("score_8",
/// "bbox_16", "kps_32") or carry generic numeric names. All nine names must
/// resolve for the name-based mapping to be used; otherwise the positional
/// convention applies.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let mut mapped = POSITIONAL_OUTPUT_INDICES;

    for (slot, stride) in SCRFD_STRIDES.iter().enumerate() {
        let lookup = |kind: &str| {
            let wanted = format!("{kind}_{stride}");
            names.iter().position(|n| *n == wanted)
        };
        match (lookup("score"), lookup("bbox"), lookup("kps")) {
            (Some(score), Some(bbox), Some(kps)) => mapped[slot] = (score, bbox, kps),
            _ => {
                tracing::info!(
                    ?names,
                    "SCRFD output names not recognized, assuming positional order \
                     [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
                );
                return POSITIONAL_OUTPUT_INDICES;
            }
        }
    }

    tracing::info!("mapped SCRFD outputs by tensor name");
    mapped
}

/// Decode one stride level into frame-space detections.
///
/// Each grid cell carries `SCRFD_ANCHORS_PER_CELL` anchors; bbox offsets are
/// distances from the anchor center in stride units.
#[allow(clippy::too_many_arguments)]
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_width: usize,
    input_height: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = input_width / stride;
    let grid_h = input_height / stride;
    let unit = stride as f32;

    let mut found = Vec::new();

    for cell in 0..grid_w * grid_h {
        let base_x = (cell % grid_w) as f32 * unit;
        let base_y = (cell / grid_w) as f32 * unit;

        for anchor in 0..SCRFD_ANCHORS_PER_CELL {
            let idx = cell * SCRFD_ANCHORS_PER_CELL + anchor;
            let Some(&score) = scores.get(idx) else {
                continue;
            };
            if score <= threshold {
                continue;
            }
            let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
                continue;
            };

            let (x1, y1) =
                letterbox.to_frame(base_x - offsets[0] * unit, base_y - offsets[1] * unit);
            let (x2, y2) =
                letterbox.to_frame(base_x + offsets[2] * unit, base_y + offsets[3] * unit);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|pts| {
                let mut lms = [(0.0f32, 0.0f32); 5];
                for (i, lm) in lms.iter_mut().enumerate() {
                    *lm = letterbox
                        .to_frame(base_x + pts[i * 2] * unit, base_y + pts[i * 2 + 1] * unit);
                }
                lms
            });

            found.push(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            });
        }
    }

    found
}

/// Non-Maximum Suppression. Survivors come out in descending confidence
/// order; a candidate is dropped when it overlaps an already-kept box by
/// more than `iou_threshold`.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union of two boxes. Zero when the union is empty.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap = |a0: f32, a_len: f32, b0: f32, b_len: f32| {
        ((a0 + a_len).min(b0 + b_len) - a0.max(b0)).max(0.0)
    };

    let inter = overlap(a.x, a.width, b.x, b.width) * overlap(a.y, a.height, b.y, b.height);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
            landmarks: None,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = boxed(3.0, 7.0, 40.0, 60.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = boxed(0.0, 0.0, 4.0, 4.0, 1.0);
        let b = boxed(10.0, 10.0, 4.0, 4.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn iou_of_shifted_boxes() {
        // 8x8 boxes offset by half a width: inter 32, union 96.
        let a = boxed(0.0, 0.0, 8.0, 8.0, 1.0);
        let b = boxed(4.0, 0.0, 8.0, 8.0, 1.0);
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero() {
        let a = boxed(5.0, 5.0, 0.0, 0.0, 1.0);
        assert_eq!(iou(&a, &a), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_detections() {
        let candidates = vec![
            boxed(0.0, 0.0, 50.0, 50.0, 0.95),
            boxed(2.0, 2.0, 50.0, 50.0, 0.6),
            boxed(200.0, 0.0, 30.0, 30.0, 0.5),
        ];
        let kept = nms(candidates, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
        assert!((kept[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_disjoint_detections_in_confidence_order() {
        let candidates = vec![
            boxed(0.0, 0.0, 10.0, 10.0, 0.55),
            boxed(100.0, 0.0, 10.0, 10.0, 0.9),
            boxed(0.0, 100.0, 10.0, 10.0, 0.7),
        ];
        let kept = nms(candidates, 0.4);
        assert_eq!(kept.len(), 3);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
        assert!((kept[2].confidence - 0.55).abs() < 1e-6);
    }

    #[test]
    fn nms_of_nothing_is_nothing() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn letterbox_maps_back_to_frame_space() {
        // Portrait 240x320 into a 640x640 input: scale 2, pad_x 80, pad_y 0.
        let letterbox = LetterboxInfo {
            scale: 2.0,
            pad_x: 80.0,
            pad_y: 0.0,
        };

        let (x, y) = letterbox.to_frame(100.0 * 2.0 + 80.0, 50.0 * 2.0);
        assert!((x - 100.0).abs() < 1e-4, "x = {x}");
        assert!((y - 50.0).abs() < 1e-4, "y = {y}");
    }

    #[test]
    fn resample_clamps_at_frame_edges() {
        let frame = Frame::solid(4, 4, [200, 100, 50]);
        let rgb = resample_clamped(&frame, -0.5, -0.5);
        assert!((rgb[0] - 200.0).abs() < 1e-3);
        assert!((rgb[1] - 100.0).abs() < 1e-3);
        assert!((rgb[2] - 50.0).abs() < 1e-3);
    }

    #[test]
    fn resample_interpolates_between_pixels() {
        let mut frame = Frame::solid(2, 1, [0, 0, 0]);
        frame.data[3] = 100; // right pixel red channel
        let rgb = resample_clamped(&frame, 0.5, 0.0);
        assert!((rgb[0] - 50.0).abs() < 1e-3, "r = {}", rgb[0]);
    }

    #[test]
    fn output_indices_from_stride_names() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32", //
            "bbox_8", "bbox_16", "bbox_32", //
            "kps_8", "kps_16", "kps_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let indices = discover_output_indices(&names);

        assert_eq!(indices[0], (0, 3, 6));
        assert_eq!(indices[1], (1, 4, 7));
        assert_eq!(indices[2], (2, 5, 8));
    }

    #[test]
    fn output_indices_from_shuffled_names() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", //
            "bbox_16", "kps_16", "score_16", //
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let indices = discover_output_indices(&names);

        assert_eq!(indices[0], (2, 0, 1));
        assert_eq!(indices[1], (5, 3, 4));
        assert_eq!(indices[2], (8, 6, 7));
    }

    #[test]
    fn output_indices_fall_back_for_generic_names() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), POSITIONAL_OUTPUT_INDICES);
    }

    #[test]
    fn output_indices_fall_back_when_any_name_is_missing() {
        // kps_32 absent: one missing name invalidates the whole mapping.
        let names: Vec<String> = [
            "score_8", "score_16", "score_32", //
            "bbox_8", "bbox_16", "bbox_32", //
            "kps_8", "kps_16", "extra",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(discover_output_indices(&names), POSITIONAL_OUTPUT_INDICES);
    }

    #[test]
    fn decode_stride_maps_anchor_to_frame_space() {
        // One anchor above threshold at stride 8, grid cell (1, 1), with
        // symmetric 1-stride offsets. No letterbox displacement.
        let grid = 640 / 8;
        let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; num_anchors];
        let mut bboxes = vec![0.0f32; num_anchors * 4];
        let mut kps = vec![0.0f32; num_anchors * 10];

        // Anchors per cell are interleaved: idx = (row * grid + col) * 2.
        let idx = (grid + 1) * 2;
        scores[idx] = 0.9;
        bboxes[idx * 4] = 1.0;
        bboxes[idx * 4 + 1] = 1.0;
        bboxes[idx * 4 + 2] = 1.0;
        bboxes[idx * 4 + 3] = 1.0;
        kps[idx * 10] = -1.0;
        kps[idx * 10 + 1] = -1.0;

        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let dets = decode_stride(&scores, &bboxes, &kps, 8, 640, 640, &letterbox, 0.5);

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // Anchor center (8, 8), offsets of one stride each side: 0..16.
        assert!((d.x - 0.0).abs() < 1e-4);
        assert!((d.y - 0.0).abs() < 1e-4);
        assert!((d.width - 16.0).abs() < 1e-4);
        assert!((d.height - 16.0).abs() < 1e-4);

        let lms = d.landmarks.unwrap();
        assert_eq!(lms[0], (0.0, 0.0));
        assert_eq!(lms[1], (8.0, 8.0));
    }

    #[test]
    fn decode_stride_excludes_scores_at_threshold() {
        let grid = 640 / 32;
        let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; num_anchors];
        let bboxes = vec![0.5f32; num_anchors * 4];
        let kps = vec![0.0f32; num_anchors * 10];

        scores[0] = 0.5;

        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let dets = decode_stride(&scores, &bboxes, &kps, 32, 640, 640, &letterbox, 0.5);
        assert!(dets.is_empty());
    }
}
