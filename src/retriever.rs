//! Query-time retrieval: embed the question, search the index, widen the
//! search when too little comes back, and shape the hits into passages.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    embedding::{EmbeddingProvider, RetryPolicy, embed_all},
    error::{EmbeddingError, Result},
    vector_index::{SearchResult, VectorIndex},
};

/// Terms appended to troubleshooting questions when the first search is thin.
pub const DEFAULT_EXPANSION_TERMS: [&str; 5] =
    ["diagnostic", "troubleshoot", "symptom", "repair", "maintenance"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Results requested when the caller gives no `k`.
    pub default_k: usize,
    /// Fewer hits than this triggers query expansion.
    pub min_results: usize,
    pub expansion_terms: Vec<String>,
    /// Results requested per expanded query.
    pub expansion_k: usize,
    /// Cap on the merged result list.
    pub max_total: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            min_results: 3,
            expansion_terms: DEFAULT_EXPANSION_TERMS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            expansion_k: 3,
            max_total: 10,
        }
    }
}

/// A retrieved chunk ready for a downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    /// Chunk text with surrounding whitespace trimmed.
    pub text: String,
    pub page: Option<u32>,
    pub score: f32,
    pub chunk_index: usize,
}

impl Passage {
    fn from_hit(hit: &SearchResult<'_>) -> Self {
        Self {
            text: hit.chunk.text.trim().to_string(),
            page: hit.chunk.page,
            score: hit.score,
            chunk_index: hit.chunk.index,
        }
    }

    /// Passage text with its page reference appended.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::retriever::Passage;
    ///
    /// let p = Passage {
    ///     text: "Replace the wiper blades.".into(),
    ///     page: Some(42),
    ///     score: 0.8,
    ///     chunk_index: 3,
    /// };
    /// assert_eq!(p.formatted(), "Replace the wiper blades. (Page 42)");
    /// ```
    pub fn formatted(&self) -> String {
        match self.page {
            Some(page) => format!("{} (Page {page})", self.text),
            None => self.text.clone(),
        }
    }
}

/// Expanded variants of `query`, one per configured term it mentions.
///
/// Matching is a case-insensitive substring test, so "troubleshooting"
/// matches the term "troubleshoot".
///
/// # Examples
///
/// ```
/// use manualseek::retriever::expansion_queries;
///
/// let terms = vec!["repair".to_string(), "symptom".to_string()];
/// assert_eq!(
///     expansion_queries("How do I Repair the horn?", &terms),
///     vec!["How do I Repair the horn? repair".to_string()]
/// );
/// assert!(expansion_queries("tire pressure", &terms).is_empty());
/// ```
pub fn expansion_queries(query: &str, terms: &[String]) -> Vec<String> {
    let lowered = query.to_lowercase();
    terms
        .iter()
        .filter(|term| !term.is_empty() && lowered.contains(&term.to_lowercase()))
        .map(|term| format!("{query} {term}"))
        .collect()
}

/// Runs queries against one index snapshot.
pub struct Retriever<'a> {
    provider: &'a dyn EmbeddingProvider,
    index: Arc<VectorIndex>,
    config: &'a RetrieverConfig,
    retry: &'a RetryPolicy,
}

impl<'a> Retriever<'a> {
    pub fn new(
        provider: &'a dyn EmbeddingProvider,
        index: Arc<VectorIndex>,
        config: &'a RetrieverConfig,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            provider,
            index,
            config,
            retry,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Retrieve passages for `query`.
    ///
    /// Provider failures are returned as errors; an empty list always means
    /// nothing matched.
    pub fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<Passage>> {
        let k = k.unwrap_or(self.config.default_k);

        let query_vector = self
            .embed(std::slice::from_ref(&query.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::Fatal("provider returned no query vector".into())
            })?;

        let mut passages: Vec<Passage> = self
            .search(&query_vector, k, threshold)?
            .iter()
            .map(Passage::from_hit)
            .collect();
        tracing::debug!(query, hits = passages.len(), "initial search");

        if passages.len() < self.config.min_results {
            let expanded = expansion_queries(query, &self.config.expansion_terms);
            if !expanded.is_empty() {
                tracing::debug!(
                    count = expanded.len(),
                    "few results, searching expanded queries"
                );
                let vectors = self.embed(&expanded)?;
                for vector in &vectors {
                    passages.extend(
                        self.search(vector, self.config.expansion_k, threshold)?
                            .iter()
                            .map(Passage::from_hit),
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        passages.retain(|p| !p.text.is_empty() && seen.insert(p.chunk_index));
        passages.truncate(self.config.max_total);

        Ok(passages)
    }

    /// [`retrieve`](Self::retrieve), rendered with page references.
    pub fn retrieve_formatted(
        &self,
        query: &str,
        k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<String>> {
        Ok(self
            .retrieve(query, k, threshold)?
            .iter()
            .map(Passage::formatted)
            .collect())
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_all(self.provider, texts, texts.len(), self.retry).inspect_err(
            |e| tracing::warn!("query embedding failed: {e}"),
        )
    }

    fn search(
        &self,
        vector: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult<'_>>> {
        match threshold {
            Some(t) => self.index.search_with_threshold(vector, k, t),
            None => self.index.search(vector, k),
        }
    }
}
