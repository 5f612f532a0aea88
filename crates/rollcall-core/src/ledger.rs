//! Append-only CSV attendance ledger.
//!
//! The ledger is a flat file with a `Name,Time` header and one row per
//! first sighting. Rows are only ever appended; nothing in this module
//! rewrites or reorders existing content.

use chrono::NaiveDateTime;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LEDGER_HEADER: &str = "Name,Time";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("identity {0:?} contains characters that would corrupt the ledger")]
    InvalidIdentity(String),
    #[error("failed to create ledger {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to append to ledger {path}: {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Handle to the attendance CSV file.
#[derive(Debug)]
pub struct AttendanceLedger {
    path: PathBuf,
}

impl AttendanceLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the ledger file with its header row if it does not exist yet.
    /// An existing file is left untouched, whatever it contains.
    pub fn bootstrap(&self) -> Result<(), LedgerError> {
        if self.path.exists() {
            return Ok(());
        }
        std::fs::write(&self.path, format!("{LEDGER_HEADER}\n")).map_err(|source| {
            LedgerError::Bootstrap {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::info!(path = %self.path.display(), "created attendance ledger");
        Ok(())
    }

    /// Append one attendance row.
    ///
    /// The file is opened, written with a single call, and closed again so
    /// a crash can lose at most the row being written. A missing file is an
    /// error here; [`bootstrap`](Self::bootstrap) creates it.
    pub fn append(&mut self, identity: &str, when: NaiveDateTime) -> Result<(), LedgerError> {
        if identity.contains(',') || identity.contains('\n') || identity.contains('\r') {
            return Err(LedgerError::InvalidIdentity(identity.to_string()));
        }

        let row = format!("{identity},{}\n", when.format(TIMESTAMP_FORMAT));

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Append {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(row.as_bytes())
            .map_err(|source| LedgerError::Append {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(identity, path = %self.path.display(), "attendance recorded");
        Ok(())
    }
}
