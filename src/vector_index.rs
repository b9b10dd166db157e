//! In-memory nearest-neighbour index over chunk embeddings.
//!
//! Scores are cosine similarities: higher is better, in `[-1, 1]`. A
//! zero-norm vector scores `0.0` against everything. Search is exhaustive;
//! a single manual produces at most a few thousand chunks.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    embedding::Embedding,
    error::{Error, Result},
};

/// Free-form string metadata stored next to each chunk.
pub type Metadata = BTreeMap<String, String>;

/// One indexed chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Embedding,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A scored hit, borrowing its chunk from the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// An immutable set of entries built for one fingerprint.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    fingerprint: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Build an index, checking that every embedding has `dimension`
    /// components.
    pub fn build(
        fingerprint: impl Into<String>,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.len(),
            });
        }

        let norms = entries.iter().map(|e| l2_norm(&e.embedding)).collect();

        Ok(Self {
            fingerprint: fingerprint.into(),
            dimension,
            entries,
            norms,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The `k` most similar chunks, best first.
    ///
    /// Ties keep insertion order. `k == 0` or an empty index gives an empty
    /// list.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::chunking::Chunk;
    /// use manualseek::vector_index::{IndexEntry, VectorIndex};
    ///
    /// let entry = |i: usize, v: Vec<f32>| IndexEntry {
    ///     chunk: Chunk {
    ///         document_id: "m".into(),
    ///         index: i,
    ///         start: 0,
    ///         end: 1,
    ///         text: format!("chunk {i}"),
    ///         page: None,
    ///     },
    ///     embedding: v,
    ///     metadata: Default::default(),
    /// };
    /// let index = VectorIndex::build(
    ///     "fp",
    ///     2,
    ///     vec![entry(0, vec![1.0, 0.0]), entry(1, vec![0.0, 1.0])],
    /// )
    /// .unwrap();
    ///
    /// let hits = index.search(&[0.1, 0.9], 1).unwrap();
    /// assert_eq!(hits[0].chunk.index, 1);
    /// assert_eq!(hits[0].rank, 1);
    /// ```
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult<'_>>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .par_iter()
            .zip(self.norms.par_iter())
            .enumerate()
            .map(|(i, (entry, &norm))| {
                (i, cosine(query, query_norm, &entry.embedding, norm))
            })
            .filter(|(_, score)| !score.is_nan())
            .collect();

        // stable: equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(pos, (i, score))| SearchResult {
                chunk: &self.entries[i].chunk,
                score,
                rank: pos + 1,
            })
            .collect())
    }

    /// [`search`](Self::search) restricted to hits with `score >= threshold`.
    pub fn search_with_threshold(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult<'_>>> {
        let mut hits = self.search(query, k)?;
        hits.retain(|hit| hit.score >= threshold);
        Ok(hits)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / (a_norm * b_norm)).clamp(-1.0, 1.0)
}
