//! Nearest-neighbor identity matching against the gallery.

use crate::gallery::Gallery;
use crate::types::Encoding;
use crate::vision::FaceVision;

/// Largest distance at which an encoding still counts as a known identity.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Label shown for faces that match nobody in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Outcome of matching one probe encoding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// The matched identity, or `None` when nothing fell within tolerance.
    pub identity: Option<String>,
    /// Distance to the nearest gallery entry. Infinite for an empty gallery.
    pub distance: f32,
}

impl MatchDecision {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    /// On-screen label for this decision.
    pub fn display_label(&self) -> &str {
        self.identity.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Find the gallery entry nearest to `probe` under the backend's distance
/// metric.
///
/// Entries are scanned in insertion order and ties keep the earlier entry,
/// so repeated runs over the same gallery always name the same person.
pub fn resolve(
    vision: &dyn FaceVision,
    probe: &Encoding,
    gallery: &Gallery,
    tolerance: f32,
) -> MatchDecision {
    let mut best_identity: Option<&str> = None;
    let mut best_distance = f32::INFINITY;

    for entry in gallery.iter() {
        let distance = vision.distance(probe, &entry.encoding);
        if distance < best_distance {
            best_distance = distance;
            best_identity = Some(&entry.identity);
        }
    }

    if best_distance <= tolerance {
        MatchDecision {
            identity: best_identity.map(str::to_string),
            distance: best_distance,
        }
    } else {
        MatchDecision {
            identity: None,
            distance: best_distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::types::BoundingBox;
    use crate::vision::VisionError;

    /// Stub backend that leans on the trait's default Euclidean distance.
    struct EuclidVision;

    impl FaceVision for EuclidVision {
        fn detect_faces(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
            Ok(vec![])
        }

        fn encode_faces(
            &mut self,
            _frame: &Frame,
            _faces: &[BoundingBox],
        ) -> Result<Vec<Encoding>, VisionError> {
            Ok(vec![])
        }
    }

    fn gallery_of(entries: &[(&str, Vec<f32>)]) -> Gallery {
        let mut gallery = Gallery::default();
        for (name, values) in entries {
            gallery.insert(name.to_string(), Encoding::new(values.clone()));
        }
        gallery
    }

    #[test]
    fn empty_gallery_never_matches() {
        let gallery = Gallery::default();
        let probe = Encoding::new(vec![1.0, 0.0]);

        let decision = resolve(&EuclidVision, &probe, &gallery, DEFAULT_TOLERANCE);

        assert!(!decision.is_match());
        assert!(decision.distance.is_infinite());
        assert_eq!(decision.display_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn nearest_entry_within_tolerance_matches() {
        let gallery = gallery_of(&[
            ("alice", vec![0.0, 0.0]),
            ("bob", vec![10.0, 0.0]),
        ]);
        let probe = Encoding::new(vec![0.3, 0.0]);

        let decision = resolve(&EuclidVision, &probe, &gallery, DEFAULT_TOLERANCE);

        assert_eq!(decision.identity.as_deref(), Some("alice"));
        assert!((decision.distance - 0.3).abs() < 1e-6);
        assert_eq!(decision.display_label(), "alice");
    }

    #[test]
    fn nearest_entry_beyond_tolerance_is_unknown() {
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Encoding::new(vec![5.0, 0.0]);

        let decision = resolve(&EuclidVision, &probe, &gallery, DEFAULT_TOLERANCE);

        assert!(!decision.is_match());
        assert!((decision.distance - 5.0).abs() < 1e-6);
        assert_eq!(decision.display_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn distance_exactly_at_tolerance_matches() {
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Encoding::new(vec![DEFAULT_TOLERANCE, 0.0]);

        let decision = resolve(&EuclidVision, &probe, &gallery, DEFAULT_TOLERANCE);

        assert_eq!(decision.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn equidistant_entries_keep_the_first() {
        // Probe sits exactly between two enrolled encodings.
        let gallery = gallery_of(&[
            ("first", vec![0.0, 0.0]),
            ("second", vec![0.4, 0.0]),
        ]);
        let probe = Encoding::new(vec![0.2, 0.0]);

        let decision = resolve(&EuclidVision, &probe, &gallery, DEFAULT_TOLERANCE);

        assert_eq!(decision.identity.as_deref(), Some("first"));
    }
}
