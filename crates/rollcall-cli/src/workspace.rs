//! Data-directory bootstrap.
//!
//! Runs once at startup so every workflow can assume the gallery and
//! staging directories exist and the ledger has its header.

use crate::config::Config;
use anyhow::{Context, Result};
use rollcall_core::AttendanceLedger;

pub fn bootstrap(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.gallery_dir).with_context(|| {
        format!(
            "could not create gallery directory {}",
            config.gallery_dir.display()
        )
    })?;
    std::fs::create_dir_all(&config.staging_dir).with_context(|| {
        format!(
            "could not create staging directory {}",
            config.staging_dir.display()
        )
    })?;

    if let Some(parent) = config.ledger_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("could not create ledger directory {}", parent.display())
            })?;
        }
    }
    AttendanceLedger::new(config.ledger_path.clone()).bootstrap()?;

    tracing::debug!(
        gallery = %config.gallery_dir.display(),
        ledger = %config.ledger_path.display(),
        "workspace ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            data_dir: root.to_path_buf(),
            gallery_dir: root.join("known_faces"),
            ledger_path: root.join("records/attendance.csv"),
            staging_dir: root.join("captured_faces"),
            ..Config::default()
        }
    }

    #[test]
    fn bootstrap_creates_directories_and_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        bootstrap(&config).unwrap();

        assert!(config.gallery_dir.is_dir());
        assert!(config.staging_dir.is_dir());
        let content = std::fs::read_to_string(&config.ledger_path).unwrap();
        assert_eq!(content, "Name,Time\n");
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        bootstrap(&config).unwrap();
        std::fs::write(&config.ledger_path, "Name,Time\nalice,2026-03-14 09:00:00\n").unwrap();
        bootstrap(&config).unwrap();

        let content = std::fs::read_to_string(&config.ledger_path).unwrap();
        assert!(content.contains("alice"), "existing rows survive re-bootstrap");
    }
}
