
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::parser::Document;
use crate::store::ChunkRecord;

/// Configuration for content chunking, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum length of a chunk
    pub chunk_size: usize,
    /// Number of characters shared by adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Chunker::try_from(*self).map(|_| ())
    }
}

/// Splits text into fixed-size, overlapping character windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(chunk_size));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::OverlapTooLarge(chunk_overlap, chunk_size));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Distance in characters between the starts of consecutive chunks
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Iterate over the chunks of `text`.
    ///
    /// The iterator is cheap to clone, so a caller can restart the sequence
    /// from any point. Blank text produces no chunks.
    #[inline]
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        let boundaries = if text.trim().is_empty() {
            Vec::new()
        } else {
            text.char_indices()
                .map(|(offset, _)| offset)
                .chain(std::iter::once(text.len()))
                .collect()
        };

        Chunks {
            text,
            boundaries,
            chunk_size: self.chunk_size,
            stride: self.stride(),
            next_start: 0,
        }
    }

    /// Chunk a parsed document into records tagged with its source
    #[inline]
    pub fn chunk_document(&self, document: &Document) -> Vec<ChunkRecord> {
        let records: Vec<ChunkRecord> = self
            .chunks(&document.text)
            .map(|text| ChunkRecord {
                source: document.source.clone(),
                text: text.to_string(),
            })
            .collect();

        debug!(
            "Chunked '{}' ({} chars) into {} chunks",
            document.source,
            document.text.chars().count(),
            records.len()
        );

        records
    }
}

impl TryFrom<ChunkingConfig> for Chunker {
    type Error = ConfigError;

    #[inline]
    fn try_from(config: ChunkingConfig) -> Result<Self, Self::Error> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

/// Iterator over the character windows of a text
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length
    boundaries: Vec<usize>,
    chunk_size: usize,
    stride: usize,
    /// Character index where the next chunk begins
    next_start: usize,
}

impl Chunks<'_> {
    fn char_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let char_count = self.char_count();
        if self.next_start >= char_count {
            return None;
        }

        let start = self.next_start;
        let end = (start + self.chunk_size).min(char_count);

        // The window that reaches the end of the text is the last one
        self.next_start = if end == char_count {
            char_count
        } else {
            start + self.stride
        };

        self.text
            .get(*self.boundaries.get(start)?..*self.boundaries.get(end)?)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let char_count = self.char_count();
        if self.next_start >= char_count {
            return (0, Some(0));
        }

        let remaining = char_count - self.next_start;
        let count = if remaining <= self.chunk_size {
            1
        } else {
            1 + (remaining - self.chunk_size).div_ceil(self.stride)
        };
        (count, Some(count))
    }
}

impl ExactSizeIterator for Chunks<'_> {}
