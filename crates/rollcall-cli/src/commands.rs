//! Subcommand implementations shared by the CLI and the menu.

use crate::config::Config;
use anyhow::{Context, Result};
use rollcall_core::{
    AttendanceLedger, CaptureIntake, CaptureOutcome, Gallery, OnnxVision, RecognitionSession,
    SessionError,
};
use rollcall_hw::{Camera, TerminalSurface};
use std::path::Path;

/// Printed when a session cannot start because nothing usable is enrolled.
/// Reference photos are only vetted at gallery load, never at capture time.
fn empty_gallery_guidance(gallery_dir: &Path) -> String {
    format!(
        "No usable reference photos in {} yet. Add JPEG or PNG images named \
         after each person, with one clear and well-lit face per photo, or \
         run `rollcall capture <name>`.",
        gallery_dir.display()
    )
}

/// Run one recognition session against the camera.
pub fn attend(config: &Config, json: bool) -> Result<()> {
    let mut vision = OnnxVision::open(&config.model_dir, config.detection_threshold)
        .context("could not start the vision backend")?;

    let gallery = Gallery::load(&config.gallery_dir, &mut vision)
        .context("could not load the reference gallery")?;

    let session = match RecognitionSession::new(gallery, config.tolerance, config.downscale) {
        Ok(session) => session,
        Err(SessionError::EmptyGallery) => {
            println!("{}", empty_gallery_guidance(&config.gallery_dir));
            return Ok(());
        }
    };

    let mut camera = Camera::open(&config.camera_device)
        .with_context(|| format!("could not open camera {}", config.camera_device))?;
    let mut ledger = AttendanceLedger::new(config.ledger_path.clone());

    // The surface drops before anything is printed, restoring the terminal.
    let summary = {
        let mut surface = TerminalSurface::with_hint("[q] finish session");
        session.run(&mut vision, &mut camera, &mut surface, &mut ledger)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.is_empty() {
        println!("No attendance recorded.");
    } else {
        println!("Recorded {} attendee(s):", summary.attended.len());
        for name in &summary.attended {
            println!("  {name}");
        }
    }
    Ok(())
}

/// Capture a reference photo for `name`.
pub fn capture(config: &Config, name: &str) -> Result<()> {
    let mut camera = Camera::open(&config.camera_device)
        .with_context(|| format!("could not open camera {}", config.camera_device))?;
    let intake = CaptureIntake::new(config.gallery_dir.clone());

    let outcome = {
        let mut surface = TerminalSurface::with_hint("[s] save   [q] cancel");
        intake.capture(name, &mut camera, &mut surface)
    }
    .context("capture failed")?;

    match outcome {
        CaptureOutcome::Saved(path) => println!("Saved {}.", path.display()),
        CaptureOutcome::Cancelled => println!("Capture cancelled."),
    }
    Ok(())
}

/// List V4L2 capture devices.
pub fn devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
        return Ok(());
    }
    for d in devices {
        println!("{}  {}  (driver {}, bus {})", d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_gallery_guidance_states_the_photo_requirements() {
        let text = empty_gallery_guidance(Path::new("/data/known_faces"));

        assert!(text.contains("/data/known_faces"));
        for requirement in ["JPEG", "PNG", "one clear", "well-lit", "capture"] {
            assert!(text.contains(requirement), "{requirement:?} missing: {text}");
        }
    }
}
