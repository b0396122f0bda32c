//! Deterministic stand-ins for external collaborators used by unit tests

use std::cell::Cell;
use std::collections::HashMap;

use crate::embeddings::EmbeddingModel;

/// Bag-of-words model hashing each lowercase word into a bucket.
///
/// Vectors are deliberately left unnormalized so the adapter has work to do.
#[derive(Debug)]
pub(crate) struct HashingModel {
    dimension: usize,
    calls: Cell<usize>,
}

impl HashingModel {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Cell::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 2.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 3.0;
        }
        vector
    }
}

impl EmbeddingModel for HashingModel {
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.set(self.calls.get() + 1);
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

/// Model returning preset vectors for known texts
#[derive(Debug, Default)]
pub(crate) struct TableModel {
    vectors: HashMap<String, Vec<f32>>,
}

impl TableModel {
    pub(crate) fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl EmbeddingModel for TableModel {
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no vector for '{}'", t))
            })
            .collect()
    }
}

/// Model that always fails, as an unreachable server would
#[derive(Debug, Default)]
pub(crate) struct FailingModel;

impl EmbeddingModel for FailingModel {
    fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("embedding server unavailable"))
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
