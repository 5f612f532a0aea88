//! Known-face gallery loaded from a directory of reference photos.
//!
//! Each image file contributes one identity named after the file stem.
//! Files that cannot be read, decoded, or that contain no detectable face
//! are skipped with a warning so one bad photo never blocks a session.

use crate::types::Encoding;
use crate::vision::FaceVision;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions treated as reference photos, compared case-insensitively.
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One enrolled identity with its reference encoding.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub encoding: Encoding,
}

/// In-memory set of enrolled identities.
#[derive(Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Load every reference photo under `dir`.
    ///
    /// Files are visited in sorted path order, so when two files share a
    /// stem (`alice.jpg` and `alice.png`) the later one wins and a warning
    /// names both files. An unreadable directory is an error; an empty one
    /// yields an empty gallery.
    pub fn load(dir: &Path, vision: &mut dyn FaceVision) -> Result<Self, GalleryError> {
        let read = std::fs::read_dir(dir).map_err(|source| GalleryError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        let mut gallery = Self::default();
        let mut sources: HashMap<String, PathBuf> = HashMap::new();

        for path in &paths {
            let Some(identity) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping photo with non-UTF-8 name");
                continue;
            };

            let img = match image::open(path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable photo: {e}");
                    continue;
                }
            };
            let frame = crate::frame::Frame::from(img);

            let boxes = match vision.detect_faces(&frame) {
                Ok(boxes) => boxes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping photo, detection failed: {e}");
                    continue;
                }
            };

            if boxes.is_empty() {
                tracing::warn!(path = %path.display(), "skipping photo, no face found");
                continue;
            }
            if boxes.len() > 1 {
                tracing::debug!(
                    path = %path.display(),
                    faces = boxes.len(),
                    "photo has multiple faces, using the most confident"
                );
            }

            let encodings = match vision.encode_faces(&frame, &boxes[..1]) {
                Ok(encodings) => encodings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping photo, encoding failed: {e}");
                    continue;
                }
            };
            let Some(encoding) = encodings.into_iter().next() else {
                tracing::warn!(path = %path.display(), "skipping photo, encoder returned nothing");
                continue;
            };

            if let Some(previous) = sources.insert(identity.to_string(), path.clone()) {
                tracing::warn!(
                    identity,
                    superseded = %previous.display(),
                    kept = %path.display(),
                    "two reference photos share this name, the later file wins"
                );
            }
            tracing::debug!(identity, path = %path.display(), "enrolled reference photo");
            gallery.insert(identity.to_string(), encoding);
        }

        tracing::info!(
            dir = %dir.display(),
            identities = gallery.len(),
            "gallery loaded"
        );

        Ok(gallery)
    }

    /// Add an identity, replacing any existing entry with the same name.
    pub fn insert(&mut self, identity: String, encoding: Encoding) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.identity == identity) {
            existing.encoding = encoding;
        } else {
            self.entries.push(GalleryEntry { identity, encoding });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }
}

pub(crate) fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
