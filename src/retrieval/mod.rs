// Retrieval module
// Embeds a question and returns the best matching chunks above a threshold

#[cfg(test)]
mod tests;

use tracing::{debug, warn};

use crate::embeddings::{Embedder, EmbeddingModel};
use crate::store::KnowledgeBase;
use crate::{KbError, Result};

/// A chunk returned for a query, with its cosine similarity
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub score: f32,
    pub source: String,
    pub text: String,
}

pub struct Retriever<'a, M> {
    knowledge_base: Option<&'a KnowledgeBase>,
    embedder: &'a Embedder<M>,
}

impl<'a, M: EmbeddingModel> Retriever<'a, M> {
    /// Create a retriever; `None` means nothing has been ingested yet
    #[inline]
    pub fn new(knowledge_base: Option<&'a KnowledgeBase>, embedder: &'a Embedder<M>) -> Self {
        Self {
            knowledge_base,
            embedder,
        }
    }

    /// Return at most `k` chunks scoring at least `min_score`, best first.
    ///
    /// An empty or missing knowledge base yields no results rather than an error.
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(KbError::Config(
                "number of results must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&min_score) {
            return Err(KbError::Config(format!(
                "minimum score {} is outside [-1, 1]",
                min_score
            )));
        }

        let Some(knowledge_base) = self.knowledge_base.filter(|kb| !kb.is_empty()) else {
            debug!("Knowledge base is empty, nothing to retrieve");
            return Ok(Vec::new());
        };

        let query_vector = self.embedder.embed_one(query)?;
        let hits = match knowledge_base.search(&query_vector, k) {
            Ok(hits) => hits,
            Err(KbError::EmptyIndex) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if hit.score < min_score {
                continue;
            }

            match knowledge_base.record(hit.position) {
                Ok(record) => results.push(RetrievedChunk {
                    score: hit.score,
                    source: record.source.clone(),
                    text: record.text.clone(),
                }),
                Err(e) => warn!("Dropping search hit without metadata: {}", e),
            }
        }

        debug!(
            "Retrieved {} chunks for query (k = {}, min_score = {})",
            results.len(),
            k,
            min_score
        );
        Ok(results)
    }
}
