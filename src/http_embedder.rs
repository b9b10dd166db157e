//! Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    embedding::{Embedding, EmbeddingProvider},
    error::{EmbeddingError, Error, Result},
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Calls `POST {base_url}/embeddings` with a blocking client.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be greater than zero".into(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            dimension,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_send_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(self.timeout)
        } else if err.is_builder() {
            EmbeddingError::Fatal(format!("invalid request to {}: {err}", self.url))
        } else {
            EmbeddingError::Transient(format!("request to {} failed: {err}", self.url))
        }
    }
}

/// Map a non-success HTTP status to a provider error.
///
/// Request timeouts, rate limiting and server errors are transient;
/// everything else (bad key, unknown model, malformed input) is fatal.
pub fn classify_status(status: StatusCode, body: &str) -> EmbeddingError {
    let message = format!("embedding service returned HTTP {status}: {body}");
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        EmbeddingError::Transient(message)
    } else {
        EmbeddingError::Fatal(message)
    }
}

impl EmbeddingProvider for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(ref api_key) = self.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbedResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout(self.timeout)
            } else {
                EmbeddingError::Fatal(format!("malformed embedding response: {e}"))
            }
        })?;

        let mut data = parsed.data;
        if data.len() != texts.len() {
            return Err(EmbeddingError::Fatal(format!(
                "embedding service returned {} vectors for {} inputs",
                data.len(),
                texts.len()
            )));
        }
        data.sort_by_key(|d| d.index);

        tracing::debug!(count = data.len(), model = %self.model, "received embeddings");
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}
