//! Embedding providers and the batching/retry loop around them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Error, Result};

/// A dense vector produced by an [`EmbeddingProvider`].
pub type Embedding = Vec<f32>;

/// Turns text into fixed-dimension vectors.
///
/// Implementations return exactly one vector per input, in input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identity of the model, recorded in index fingerprints.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError>;
}

/// How transient provider failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first one.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff before the given retry (1 for the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Embed `texts` in batches of `batch_size`, retrying transient failures.
///
/// Fatal provider errors abort immediately. The output is checked for count
/// and dimensionality before it is returned; a misbehaving provider never
/// produces a partially filled result.
pub fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    retry: &RetryPolicy,
) -> Result<Vec<Embedding>> {
    let batch_size = batch_size.max(1);
    let dimension = provider.dimension();
    let mut out = Vec::with_capacity(texts.len());

    for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
        let vectors = embed_batch_with_retry(provider, batch, retry)?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingError::Fatal(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            ))
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        tracing::debug!(batch = batch_idx, size = batch.len(), "embedded batch");
        out.extend(vectors);
    }

    Ok(out)
}

fn embed_batch_with_retry(
    provider: &dyn EmbeddingProvider,
    batch: &[String],
    retry: &RetryPolicy,
) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match provider.embed(batch) {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = retry.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    ?wait,
                    "embedding request failed, retrying: {e}"
                );
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

const HASH_UNIGRAM_WEIGHT: f32 = 1.0;
const HASH_BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic offline embedder based on feature hashing.
///
/// Lower-cased alphanumeric tokens and adjacent-token bigrams are hashed
/// with blake3 into signed buckets; the result is L2-normalised. Texts that
/// share vocabulary end up with high cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "hashing embedder dimension must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimension,
            model_id: format!("hashing-v1-d{dimension}"),
        })
    }

    /// Embed a single text.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            self.accumulate(&mut vector, token, HASH_UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, &bigram, HASH_BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64)
            as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
