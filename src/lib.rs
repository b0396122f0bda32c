use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt knowledge base state: {0}")]
    CorruptState(String),

    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("The vector index contains no vectors")]
    EmptyIndex,

    #[error("Position {position} is out of range for a store of length {len}")]
    IndexOutOfRange { position: usize, len: usize },

    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        body: Option<String>,
    },

    #[error("Failed to ingest {}: {reason}", path.display())]
    PartialIngestion { path: PathBuf, reason: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for KbError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod parser;
pub mod retrieval;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
