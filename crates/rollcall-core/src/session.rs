//! Recognition session loop.
//!
//! A session pulls frames from a video source, detects and matches faces
//! against the gallery, records the first sighting of each identity in the
//! attendance ledger, and presents annotated frames until the source ends
//! or the user quits. Stream and vision failures stop the session with a
//! warning rather than an error; whatever attendance was recorded up to
//! that point stands.

use crate::frame::Frame;
use crate::gallery::Gallery;
use crate::ledger::AttendanceLedger;
use crate::matching;
use crate::source::VideoSource;
use crate::surface::{ControlSignal, FaceOverlay, Surface};
use crate::vision::FaceVision;
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Default divisor applied to frames before detection. Detection cost
/// scales with area, so halving each dimension quarters the work.
pub const DEFAULT_DOWNSCALE: u32 = 2;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no faces enrolled; add reference photos to the gallery before starting a session")]
    EmptyGallery,
}

/// What a finished session recorded.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    /// Identities whose first sighting was written to the ledger, sorted.
    pub attended: Vec<String>,
    pub frames_processed: u64,
    pub faces_seen: u64,
}

impl SessionSummary {
    pub fn is_empty(&self) -> bool {
        self.attended.is_empty()
    }
}

/// One attendance-taking run over a video source.
pub struct RecognitionSession {
    gallery: Gallery,
    tolerance: f32,
    downscale: u32,
    logged: BTreeSet<String>,
}

impl RecognitionSession {
    /// Prepare a session. Refuses to start against an empty gallery, since
    /// every face would come up unknown.
    pub fn new(gallery: Gallery, tolerance: f32, downscale: u32) -> Result<Self, SessionError> {
        if gallery.is_empty() {
            return Err(SessionError::EmptyGallery);
        }
        tracing::debug!(
            identities = gallery.len(),
            tolerance,
            downscale,
            "session ready"
        );
        Ok(Self {
            gallery,
            tolerance,
            downscale: downscale.max(1),
            logged: BTreeSet::new(),
        })
    }

    /// Run the session to completion and report what was recorded.
    ///
    /// Detection runs on a downscaled copy of each frame; overlay boxes are
    /// scaled back up so they land on the full-resolution frame that the
    /// surface shows.
    pub fn run(
        mut self,
        vision: &mut dyn FaceVision,
        source: &mut dyn VideoSource,
        surface: &mut dyn Surface,
        ledger: &mut AttendanceLedger,
    ) -> SessionSummary {
        tracing::info!(
            identities = self.gallery.len(),
            tolerance = self.tolerance,
            downscale = self.downscale,
            "session started"
        );

        let mut frames_processed: u64 = 0;
        let mut faces_seen: u64 = 0;

        loop {
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("stopping session, video source failed: {e}");
                    break;
                }
            };
            frames_processed += 1;

            let scaled = if self.downscale > 1 {
                Some(frame.downscale(self.downscale))
            } else {
                None
            };
            let work = scaled.as_ref().unwrap_or(&frame);

            let boxes = match vision.detect_faces(work) {
                Ok(boxes) => boxes,
                Err(e) => {
                    tracing::warn!("stopping session, face detection failed: {e}");
                    break;
                }
            };
            let encodings = match vision.encode_faces(work, &boxes) {
                Ok(encodings) => encodings,
                Err(e) => {
                    tracing::warn!("stopping session, face encoding failed: {e}");
                    break;
                }
            };

            let mut overlays = Vec::with_capacity(boxes.len());
            for (bbox, encoding) in boxes.iter().zip(&encodings) {
                faces_seen += 1;
                let decision =
                    matching::resolve(&*vision, encoding, &self.gallery, self.tolerance);
                if let Some(identity) = decision.identity.clone() {
                    self.mark_attended(&identity, ledger);
                }
                overlays.push(FaceOverlay {
                    bbox: bbox.scaled(self.downscale as f32),
                    label: decision.display_label().to_string(),
                });
            }

            surface.present(&frame, &overlays);

            match surface.poll_control() {
                Some(ControlSignal::Quit) => {
                    tracing::info!("stop requested");
                    break;
                }
                Some(ControlSignal::Save) | None => {}
            }
        }

        let summary = SessionSummary {
            attended: self.logged.into_iter().collect(),
            frames_processed,
            faces_seen,
        };
        tracing::info!(
            attended = summary.attended.len(),
            frames = summary.frames_processed,
            "session stopped"
        );
        summary
    }

    /// Record `identity` in the ledger the first time it is seen. A failed
    /// write is not remembered as logged, so the next sighting retries it.
    fn mark_attended(&mut self, identity: &str, ledger: &mut AttendanceLedger) {
        if self.logged.contains(identity) {
            return;
        }
        match ledger.append(identity, Local::now().naive_local()) {
            Ok(()) => {
                self.logged.insert(identity.to_string());
                tracing::info!(identity, "first sighting recorded");
            }
            Err(e) => {
                tracing::warn!(identity, "could not record sighting, will retry: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use crate::types::{BoundingBox, Encoding};
    use crate::vision::VisionError;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Detects one full-frame face in any non-black frame and encodes it
    /// as the frame's mean RGB color.
    struct ColorVision;

    impl FaceVision for ColorVision {
        fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
            if frame.mean_luma() == 0.0 {
                return Ok(vec![]);
            }
            Ok(vec![BoundingBox {
                x: 0.0,
                y: 0.0,
                width: frame.width as f32,
                height: frame.height as f32,
                confidence: 1.0,
                landmarks: None,
            }])
        }

        fn encode_faces(
            &mut self,
            frame: &Frame,
            faces: &[BoundingBox],
        ) -> Result<Vec<Encoding>, VisionError> {
            let pixels = (frame.width * frame.height) as f32;
            let mut sums = [0.0f32; 3];
            for px in frame.data.chunks_exact(3) {
                sums[0] += px[0] as f32;
                sums[1] += px[1] as f32;
                sums[2] += px[2] as f32;
            }
            Ok(faces
                .iter()
                .map(|_| Encoding::new(sums.iter().map(|s| s / pixels).collect()))
                .collect())
        }
    }

    struct ScriptedSource {
        frames: VecDeque<Frame>,
    }

    impl ScriptedSource {
        fn of(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, SourceError> {
            self.frames.pop_front().ok_or(SourceError::EndOfStream)
        }
    }

    #[derive(Default)]
    struct ScriptSurface {
        presented: Vec<Vec<FaceOverlay>>,
        controls: VecDeque<Option<ControlSignal>>,
    }

    impl Surface for ScriptSurface {
        fn present(&mut self, _frame: &Frame, overlays: &[FaceOverlay]) {
            self.presented.push(overlays.to_vec());
        }

        fn poll_control(&mut self) -> Option<ControlSignal> {
            self.controls.pop_front().flatten()
        }
    }

    fn red() -> Frame {
        Frame::solid(8, 8, [200, 10, 10])
    }

    fn green() -> Frame {
        Frame::solid(8, 8, [10, 200, 10])
    }

    fn blue() -> Frame {
        Frame::solid(8, 8, [10, 10, 200])
    }

    fn color_gallery() -> Gallery {
        let mut gallery = Gallery::default();
        gallery.insert("alice".into(), Encoding::new(vec![200.0, 10.0, 10.0]));
        gallery.insert("bob".into(), Encoding::new(vec![10.0, 200.0, 10.0]));
        gallery
    }

    fn temp_ledger(dir: &tempfile::TempDir) -> AttendanceLedger {
        let ledger = AttendanceLedger::new(dir.path().join("attendance.csv"));
        ledger.bootstrap().unwrap();
        ledger
    }

    #[test]
    fn empty_gallery_refuses_to_start() {
        let err = RecognitionSession::new(Gallery::default(), 0.6, 2).unwrap_err();
        assert!(matches!(err, SessionError::EmptyGallery));
    }

    #[test]
    fn each_identity_is_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = temp_ledger(&dir);
        let mut source = ScriptedSource::of(vec![red(), red(), green(), red()]);
        let mut surface = ScriptSurface::default();

        let session = RecognitionSession::new(color_gallery(), 10.0, 1).unwrap();
        let summary = session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        assert_eq!(summary.attended, vec!["alice", "bob"]);
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.faces_seen, 4);

        let content = std::fs::read_to_string(dir.path().join("attendance.csv")).unwrap();
        let names: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap())
            .collect();
        assert_eq!(names, ["alice", "bob"], "one row per identity, sighting order");
    }

    #[test]
    fn unknown_faces_are_seen_but_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = temp_ledger(&dir);
        let mut source = ScriptedSource::of(vec![blue()]);
        let mut surface = ScriptSurface::default();

        let session = RecognitionSession::new(color_gallery(), 10.0, 1).unwrap();
        let summary = session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        assert!(summary.is_empty());
        assert_eq!(summary.faces_seen, 1);
        assert_eq!(surface.presented.len(), 1);
        assert_eq!(surface.presented[0][0].label, "Unknown");

        let content = std::fs::read_to_string(dir.path().join("attendance.csv")).unwrap();
        assert_eq!(content, "Name,Time\n");
    }

    #[test]
    fn summary_serializes_with_stable_field_names() {
        let summary = SessionSummary {
            attended: vec!["alice".into()],
            frames_processed: 12,
            faces_seen: 3,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["attended"][0], "alice");
        assert_eq!(json["frames_processed"], 12);
        assert_eq!(json["faces_seen"], 3);
    }

    #[test]
    fn quit_signal_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = temp_ledger(&dir);
        let mut source = ScriptedSource::of(vec![red(); 10]);
        let mut surface = ScriptSurface {
            presented: Vec::new(),
            controls: VecDeque::from(vec![None, None, Some(ControlSignal::Quit)]),
        };

        let session = RecognitionSession::new(color_gallery(), 10.0, 1).unwrap();
        let summary = session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.attended, vec!["alice"]);
    }

    #[test]
    fn save_signal_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = temp_ledger(&dir);
        let mut source = ScriptedSource::of(vec![red(), red()]);
        let mut surface = ScriptSurface {
            presented: Vec::new(),
            controls: VecDeque::from(vec![Some(ControlSignal::Save)]),
        };

        let session = RecognitionSession::new(color_gallery(), 10.0, 1).unwrap();
        let summary = session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        assert_eq!(summary.frames_processed, 2, "save must not stop the session");
        assert_eq!(summary.attended, vec!["alice"]);
    }

    #[test]
    fn overlays_are_scaled_back_to_full_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = temp_ledger(&dir);
        let mut source = ScriptedSource::of(vec![red()]);
        let mut surface = ScriptSurface::default();

        // Detection sees a 4x4 downscaled frame; the overlay must cover the
        // full 8x8 frame again.
        let session = RecognitionSession::new(color_gallery(), 10.0, 2).unwrap();
        session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        let overlay = &surface.presented[0][0];
        assert_eq!(overlay.label, "alice");
        assert!((overlay.bbox.width - 8.0).abs() < 1e-6);
        assert!((overlay.bbox.height - 8.0).abs() < 1e-6);
    }

    /// Creates the missing ledger file after the first frame, as if the
    /// operator fixed the path mid-session.
    struct RecoveringSurface {
        ledger_path: PathBuf,
        presents: usize,
    }

    impl Surface for RecoveringSurface {
        fn present(&mut self, _frame: &Frame, _overlays: &[FaceOverlay]) {
            self.presents += 1;
            if self.presents == 1 {
                std::fs::write(&self.ledger_path, "Name,Time\n").unwrap();
            }
        }

        fn poll_control(&mut self) -> Option<ControlSignal> {
            None
        }
    }

    #[test]
    fn failed_ledger_write_is_retried_on_next_sighting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        // No bootstrap: the first append fails against the missing file.
        let mut ledger = AttendanceLedger::new(path.clone());
        let mut source = ScriptedSource::of(vec![red(), red()]);
        let mut surface = RecoveringSurface {
            ledger_path: path.clone(),
            presents: 0,
        };

        let session = RecognitionSession::new(color_gallery(), 10.0, 1).unwrap();
        let summary = session.run(&mut ColorVision, &mut source, &mut surface, &mut ledger);

        assert_eq!(summary.attended, vec!["alice"]);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2, "header plus exactly one row: {content:?}");
        assert!(lines[1].starts_with("alice,"));
    }
}
