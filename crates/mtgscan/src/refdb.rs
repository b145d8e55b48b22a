//! Reference hash database: persisted `(name, phash)` entries.
//!
//! The recognizer never needs reference pixels, only their hashes; the
//! database is a JSON array with each hash as a fixed-width hex string. A
//! separate tool builds it from card scans — this module only round-trips it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::phash::PerceptualHash;

/// One pre-hashed reference card.
///
/// Names are free-form and not required unique; multiple printings may share
/// a name, with ties broken by hash distance at recognition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Canonical card identifier.
    pub name: String,
    /// Perceptual hash of the reference scan.
    pub phash: PerceptualHash,
}

/// Errors loading or saving a reference database.
#[derive(Debug)]
pub enum RefDbError {
    /// Filesystem failure.
    Io(std::io::Error),
    /// The file is not a valid reference database.
    Format(serde_json::Error),
}

impl std::fmt::Display for RefDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "reference database I/O error: {}", err),
            Self::Format(err) => write!(f, "malformed reference database: {}", err),
        }
    }
}

impl std::error::Error for RefDbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RefDbError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for RefDbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err)
    }
}

/// Load all reference entries from a database file.
pub fn load(path: &Path) -> Result<Vec<ReferenceEntry>, RefDbError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Write reference entries to a database file, replacing any existing one.
pub fn save(path: &Path, entries: &[ReferenceEntry]) -> Result<(), RefDbError> {
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json)?;
    Ok(())
}
