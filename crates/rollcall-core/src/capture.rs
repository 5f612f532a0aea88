//! Reference-photo capture.
//!
//! Shows a live preview until the user saves or cancels. Saving first
//! removes any other photo of the same name, then writes `<name>.jpg` into
//! the gallery directory, so the new capture is the only reference left.

use crate::frame::Frame;
use crate::gallery::has_image_extension;
use crate::source::{SourceError, VideoSource};
use crate::surface::{ControlSignal, Surface};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("invalid name {0:?}: names cannot be empty or contain path separators, commas, or line breaks")]
    InvalidIdentity(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to save reference photo {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("failed to remove superseded reference photo {path}: {source}")]
    Replace {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How a capture run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved(PathBuf),
    Cancelled,
}

/// Captures reference photos into the gallery directory.
pub struct CaptureIntake {
    gallery_dir: PathBuf,
}

impl CaptureIntake {
    pub fn new(gallery_dir: PathBuf) -> Self {
        Self { gallery_dir }
    }

    /// Run the capture preview for `identity`.
    ///
    /// The first frame must arrive before the preview starts, so a dead
    /// camera fails immediately instead of presenting an empty loop. After
    /// that, each poll without input advances to the next frame; a save
    /// stores the frame currently on screen.
    pub fn capture(
        &self,
        identity: &str,
        source: &mut dyn VideoSource,
        surface: &mut dyn Surface,
    ) -> Result<CaptureOutcome, CaptureError> {
        let identity = identity.trim();
        validate_identity(identity)?;

        let mut frame = source.next_frame()?;
        tracing::info!(identity, "capture preview started");

        loop {
            surface.present(&frame, &[]);
            match surface.poll_control() {
                Some(ControlSignal::Save) => {
                    let path = self.save(identity, &frame)?;
                    tracing::info!(identity, path = %path.display(), "reference photo saved");
                    return Ok(CaptureOutcome::Saved(path));
                }
                Some(ControlSignal::Quit) => {
                    tracing::info!(identity, "capture cancelled");
                    return Ok(CaptureOutcome::Cancelled);
                }
                None => frame = source.next_frame()?,
            }
        }
    }

    fn save(&self, identity: &str, frame: &Frame) -> Result<PathBuf, CaptureError> {
        let path = self.gallery_dir.join(format!("{identity}.jpg"));
        self.sweep_superseded(identity, &path)?;
        frame
            .to_image()
            .save(&path)
            .map_err(|source| CaptureError::Save {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Remove every other reference photo with the same stem. Runs before
    /// the new capture is written: a survivor would shadow the new file
    /// when the gallery loads, since duplicate stems resolve to the last
    /// file in sorted order.
    fn sweep_superseded(&self, identity: &str, keep: &Path) -> Result<(), CaptureError> {
        let entries =
            std::fs::read_dir(&self.gallery_dir).map_err(|source| CaptureError::Replace {
                path: self.gallery_dir.clone(),
                source,
            })?;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.as_path() == keep || !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            if path.file_stem().and_then(|s| s.to_str()) == Some(identity) {
                std::fs::remove_file(&path).map_err(|source| CaptureError::Replace {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "removed superseded reference photo");
            }
        }
        Ok(())
    }
}

fn validate_identity(identity: &str) -> Result<(), CaptureError> {
    let bad = identity.is_empty()
        || identity
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ',' | '\n' | '\r'));
    if bad {
        return Err(CaptureError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}
