//! Persistent storage for the installation record.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::InstallationRecord;
use crate::document::{read_json, write_atomic, FileRead};
use crate::error::{InstallError, Result};

/// Loads and saves the installation record as `config.json`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    /// File name of the record inside the user-data directory.
    pub const FILE_NAME: &'static str = "config.json";

    /// Create a store for the given user-data directory.
    pub fn new(user_data_dir: &Path) -> Self {
        Self {
            path: user_data_dir.join(Self::FILE_NAME),
        }
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record from disk.
    pub fn load(&self) -> FileRead<InstallationRecord> {
        read_json(&self.path)
    }

    /// Save the record using an atomic write.
    pub fn save(&self, record: &InstallationRecord) -> Result<()> {
        let content =
            serde_json::to_string_pretty(record).map_err(|e| InstallError::Serialization {
                what: "installation record".to_string(),
                message: e.to_string(),
            })?;

        write_atomic(&self.path, &content)?;
        debug!(
            "Saved installation record ({}) to {}",
            record.state(),
            self.path.display()
        );
        Ok(())
    }
}
