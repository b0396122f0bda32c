// Embeddings module
// Wraps an embedding backend, normalizes its vectors, and owns content chunking

pub mod chunking;
pub mod ollama;


use tracing::debug;

use crate::{KbError, Result};

pub use chunking::{Chunker, ChunkingConfig, Chunks};
pub use ollama::OllamaClient;

/// A text embedding model producing fixed-dimension vectors
pub trait EmbeddingModel {
    /// Encode every text, returning one vector per input in the same order
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

impl<M: EmbeddingModel + ?Sized> EmbeddingModel for &M {
    #[inline]
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).encode(texts)
    }
}

/// Adapter that turns raw model output into unit-length vectors, so that
/// inner product equals cosine similarity everywhere downstream.
#[derive(Debug, Clone)]
pub struct Embedder<M> {
    model: M,
}

impl<M: EmbeddingModel> Embedder<M> {
    #[inline]
    pub fn new(model: M) -> Self {
        Self { model }
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Embed a non-empty batch of texts into L2-normalized vectors
    #[inline]
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(KbError::Embedding(
                "Cannot embed an empty batch of texts".to_string(),
            ));
        }

        let mut vectors = self
            .model
            .encode(texts)
            .map_err(|e| KbError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != texts.len() {
            return Err(KbError::Embedding(format!(
                "Model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(KbError::Embedding(
                "Model returned zero-dimensional vectors".to_string(),
            ));
        }

        for (position, vector) in vectors.iter_mut().enumerate() {
            if vector.len() != dimension {
                return Err(KbError::Dimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if !normalize_l2(vector) {
                return Err(KbError::Embedding(format!(
                    "Vector {} has zero or non-finite norm and cannot be normalized",
                    position
                )));
            }
        }

        debug!(
            "Embedded {} texts into {}-dimensional vectors",
            vectors.len(),
            dimension
        );

        Ok(vectors)
    }

    /// Embed a single text, typically a query
    #[inline]
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| KbError::Embedding("Model returned no vector".to_string()))
    }
}

/// Euclidean length of a vector
#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scale `vector` to unit length in place.
///
/// Returns `false` and leaves the vector untouched when its norm is zero or
/// not finite.
#[inline]
pub fn normalize_l2(vector: &mut [f32]) -> bool {
    let norm = l2_norm(vector);
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }

    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

/// Inner product of two equal-length vectors
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
