
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::write_atomic;
use crate::{KbError, Result};

/// Paths of files that have already been ingested.
///
/// Kept sorted so the same set always serializes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenFiles {
    paths: BTreeSet<String>,
}

impl SeenFiles {
    /// Load the ledger, treating a missing file as an empty set
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No seen-files ledger at {}", path.display());
            return Ok(Self::default());
        }

        let bytes = fs::read(path)?;
        let paths: BTreeSet<String> = serde_json::from_slice(&bytes).map_err(|e| {
            KbError::CorruptState(format!(
                "Failed to decode seen-files ledger {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Loaded {} seen files from {}", paths.len(), path.display());
        Ok(Self { paths })
    }

    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.paths).map_err(|e| {
            KbError::Serialization(format!("Failed to encode seen-files ledger: {}", e))
        })?;
        write_atomic(path, &bytes)
    }

    #[inline]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    #[inline]
    pub fn insert(&mut self, path: String) -> bool {
        self.paths.insert(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl Extend<String> for SeenFiles {
    #[inline]
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.paths.extend(iter);
    }
}
