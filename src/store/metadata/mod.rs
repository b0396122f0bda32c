
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::write_atomic;
use crate::{KbError, Result};

/// A chunk of source text, stored at the same position as its vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub source: String,
    pub text: String,
}

/// Ordered, append-only list of chunk records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<ChunkRecord>,
}

impl MetadataStore {
    #[inline]
    pub fn append<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ChunkRecord>,
    {
        self.records.extend(records);
    }

    #[inline]
    pub fn get(&self, position: usize) -> Result<&ChunkRecord> {
        self.records.get(position).ok_or(KbError::IndexOutOfRange {
            position,
            len: self.records.len(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ChunkRecord> {
        self.records.iter()
    }

    #[inline]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.records)
            .map_err(|e| KbError::Serialization(format!("Failed to encode metadata: {}", e)))
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let records = serde_json::from_slice(bytes)
            .map_err(|e| KbError::CorruptState(format!("Failed to decode metadata: {}", e)))?;
        Ok(Self { records })
    }

    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let store = Self::from_bytes(&bytes)?;
        debug!("Loaded {} chunk records from {}", store.len(), path.display());
        Ok(store)
    }
}

impl FromIterator<ChunkRecord> for MetadataStore {
    #[inline]
    fn from_iter<I: IntoIterator<Item = ChunkRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MetadataStore {
    type Item = &'a ChunkRecord;
    type IntoIter = std::slice::Iter<'a, ChunkRecord>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
