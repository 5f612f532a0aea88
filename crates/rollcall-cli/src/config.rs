//! Configuration, resolved in layers: built-in defaults, then an optional
//! TOML file, then `ROLLCALL_*` environment variables.
//!
//! Relative paths are joined onto `data_dir` at the end, so a single
//! `data_dir` override relocates the gallery, staging area, and ledger
//! together.

use anyhow::{Context, Result};
use rollcall_core::{DEFAULT_DETECTION_THRESHOLD, DEFAULT_DOWNSCALE, DEFAULT_TOLERANCE};
use rollcall_hw::DEFAULT_DEVICE;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_GALLERY_DIR: &str = "known_faces";
const DEFAULT_LEDGER: &str = "attendance.csv";
const DEFAULT_STAGING_DIR: &str = "captured_faces";
const DEFAULT_MODEL_DIR: &str = "/usr/share/rollcall/models";

/// Effective configuration after all layers are applied.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parent directory for relative paths below.
    pub data_dir: PathBuf,
    /// Reference photos, one identity per file.
    pub gallery_dir: PathBuf,
    /// Attendance CSV.
    pub ledger_path: PathBuf,
    /// Reserved staging area, created empty.
    pub staging_dir: PathBuf,
    /// ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    /// Match distance cutoff.
    pub tolerance: f32,
    /// Detection downscale divisor.
    pub downscale: u32,
    /// Detector confidence cutoff.
    pub detection_threshold: f32,
}

/// Optional keys as they appear in the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    gallery_dir: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    camera_device: Option<String>,
    tolerance: Option<f32>,
    downscale: Option<u32>,
    detection_threshold: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            gallery_dir: PathBuf::from(DEFAULT_GALLERY_DIR),
            ledger_path: PathBuf::from(DEFAULT_LEDGER),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            camera_device: DEFAULT_DEVICE.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            downscale: DEFAULT_DOWNSCALE,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
        }
    }
}

impl Config {
    /// Resolve the configuration, reading `file` if one was given.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {}", path.display()))?;
            let parsed: FileConfig = toml::from_str(&text)
                .with_context(|| format!("could not parse config file {}", path.display()))?;
            config.apply_file(parsed);
            tracing::debug!(path = %path.display(), "applied config file");
        }

        config.apply_env();
        config.finalize();
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = file.gallery_dir {
            self.gallery_dir = v;
        }
        if let Some(v) = file.ledger_path {
            self.ledger_path = v;
        }
        if let Some(v) = file.staging_dir {
            self.staging_dir = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.camera_device {
            self.camera_device = v;
        }
        if let Some(v) = file.tolerance {
            self.tolerance = v;
        }
        if let Some(v) = file.downscale {
            self.downscale = v;
        }
        if let Some(v) = file.detection_threshold {
            self.detection_threshold = v;
        }
    }

    fn apply_env(&mut self) {
        env_path("ROLLCALL_DATA_DIR", &mut self.data_dir);
        env_path("ROLLCALL_GALLERY_DIR", &mut self.gallery_dir);
        env_path("ROLLCALL_LEDGER", &mut self.ledger_path);
        env_path("ROLLCALL_MODEL_DIR", &mut self.model_dir);
        env_string("ROLLCALL_CAMERA", &mut self.camera_device);
        env_f32("ROLLCALL_TOLERANCE", &mut self.tolerance);
        env_u32("ROLLCALL_DOWNSCALE", &mut self.downscale);
        env_f32("ROLLCALL_DETECTION_THRESHOLD", &mut self.detection_threshold);
    }

    /// Join relative paths onto `data_dir` and clamp nonsense values.
    fn finalize(&mut self) {
        self.gallery_dir = resolve(&self.data_dir, &self.gallery_dir);
        self.ledger_path = resolve(&self.data_dir, &self.ledger_path);
        self.staging_dir = resolve(&self.data_dir, &self.staging_dir);
        self.model_dir = resolve(&self.data_dir, &self.model_dir);

        if self.downscale == 0 {
            tracing::warn!("downscale 0 is meaningless, using 1");
            self.downscale = 1;
        }
    }
}

fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

fn env_path(key: &str, current: &mut PathBuf) {
    if let Ok(raw) = std::env::var(key) {
        *current = PathBuf::from(raw);
    }
}

fn env_string(key: &str, current: &mut String) {
    if let Ok(raw) = std::env::var(key) {
        *current = raw;
    }
}

fn env_f32(key: &str, current: &mut f32) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *current = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable numeric override"),
    }
}

fn env_u32(key: &str, current: &mut u32) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *current = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable numeric override"),
    }
}
