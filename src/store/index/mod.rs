
use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::write_atomic;
use crate::embeddings::dot;
use crate::{KbError, Result};

const INDEX_MAGIC: [u8; 4] = *b"KBVI";
const FORMAT_VERSION: u32 = 1;

/// Append-only flat index searched by exact inner product
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    /// Vectors laid out back to back in insertion order
    data: Vec<f32>,
}

/// One match from [`VectorIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Inner product with the query, equal to cosine similarity for unit vectors
    pub score: f32,
    /// Insertion position of the matched vector
    pub position: usize,
}

#[derive(Encode, Decode)]
struct IndexFile {
    magic: [u8; 4],
    version: u32,
    dimension: u64,
    count: u64,
    data: Vec<f32>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    /// Append vectors in order. Nothing is added unless every vector matches
    /// the index dimension.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(KbError::Dimension {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors, index now holds {}",
            vectors.len(),
            self.len()
        );
        Ok(())
    }

    /// The `k` best matches by descending score; equal scores keep insertion order
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() {
            return Err(KbError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(KbError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| SearchHit {
                score: dot(vector, query),
                position,
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank);

        Ok(hits)
    }

    /// Serialize dimension, count and vectors in insertion order
    #[inline]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let file = IndexFile {
            magic: INDEX_MAGIC,
            version: FORMAT_VERSION,
            dimension: self.dimension as u64,
            count: self.len() as u64,
            data: self.data.clone(),
        };

        encode_to_vec(&file, bincode_config())
            .map_err(|e| KbError::Serialization(format!("Failed to encode vector index: {}", e)))
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (file, consumed): (IndexFile, usize) = decode_from_slice(bytes, bincode_config())
            .map_err(|e| KbError::CorruptState(format!("Failed to decode vector index: {}", e)))?;

        if file.magic != INDEX_MAGIC {
            return Err(KbError::CorruptState(
                "vector index file has an unknown format".to_string(),
            ));
        }
        if file.version != FORMAT_VERSION {
            return Err(KbError::CorruptState(format!(
                "unsupported vector index version {}",
                file.version
            )));
        }
        if consumed != bytes.len() {
            return Err(KbError::CorruptState(format!(
                "vector index file has {} trailing bytes",
                bytes.len() - consumed
            )));
        }

        let dimension = usize::try_from(file.dimension)
            .map_err(|_| KbError::CorruptState("vector dimension overflows".to_string()))?;
        let expected = usize::try_from(file.count)
            .ok()
            .and_then(|count| count.checked_mul(dimension));
        if expected != Some(file.data.len()) {
            return Err(KbError::CorruptState(format!(
                "vector index declares {} vectors of dimension {} but holds {} values",
                file.count,
                dimension,
                file.data.len()
            )));
        }

        Ok(Self {
            dimension,
            data: file.data,
        })
    }

    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let index = Self::from_bytes(&bytes)?;
        debug!(
            "Loaded {} vectors of dimension {} from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }
}

fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}
