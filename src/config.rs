use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::ChunkingConfig,
    embedding::{EmbeddingProvider, HashingEmbedder, RetryPolicy},
    error::{Error, Result},
    http_embedder::HttpEmbedder,
    retriever::RetrieverConfig,
};

pub const DEFAULT_COLLECTION: &str = "manual";

pub const ENV_EMBEDDING_URL: &str = "MANUALSEEK_EMBEDDING_URL";
pub const ENV_EMBEDDING_MODEL: &str = "MANUALSEEK_EMBEDDING_MODEL";
pub const ENV_EMBEDDING_API_KEY: &str = "MANUALSEEK_EMBEDDING_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Offline feature-hashing embedder.
    #[default]
    Hashing,
    /// OpenAI-compatible HTTP endpoint.
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub dimension: usize,
    /// Base URL of the HTTP endpoint, without the `/embeddings` suffix.
    pub base_url: String,
    pub model: String,
    /// Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hashing,
            dimension: 384,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            timeout_secs: 30,
            batch_size: 64,
        }
    }
}

impl EmbeddingConfig {
    /// Construct the configured provider.
    pub fn build_provider(&self) -> Result<Box<dyn EmbeddingProvider>> {
        match self.provider {
            ProviderKind::Hashing => Ok(Box::new(HashingEmbedder::new(self.dimension)?)),
            ProviderKind::Http => Ok(Box::new(HttpEmbedder::new(
                &self.base_url,
                self.model.clone(),
                self.api_key.clone(),
                self.dimension,
                Duration::from_secs(self.timeout_secs),
            )?)),
        }
    }
}

/// Everything a [`Session`](crate::Session) needs besides its store path and
/// provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrieverConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrieverConfig::default(),
            embedding: EmbeddingConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; a missing file yields the defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use manualseek::config::EngineConfig;
    ///
    /// let path = tmp.path().join("config.json");
    /// std::fs::write(&path, r#"{"chunking": {"max_chunk_size": 500}}"#).unwrap();
    ///
    /// let config = EngineConfig::load(&path).unwrap();
    /// assert_eq!(config.chunking.max_chunk_size, 500);
    /// assert_eq!(config.chunking.overlap_size, 200);
    /// assert_eq!(config.collection, "manual");
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(Error::Config("collection name must not be empty".into()));
        }
        self.chunking.validate()?;
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`.
    ///
    /// Setting an embedding URL switches the provider to HTTP. The API key
    /// falls back to `OPENAI_API_KEY`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = lookup(ENV_EMBEDDING_URL) {
            self.embedding.base_url = url;
            self.embedding.provider = ProviderKind::Http;
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            self.embedding.model = model;
        }
        if let Some(key) =
            lookup(ENV_EMBEDDING_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY))
        {
            self.embedding.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.collection, "manual");
        assert_eq!(config.chunking.max_chunk_size, 1000);
        assert_eq!(config.chunking.overlap_size, 200);
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn invalid_json_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(EngineConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_chunking_in_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"chunking": {"max_chunk_size": 100, "overlap_size": 150}}"#,
        )
        .unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(Error::InvalidChunking(_))
        ));
    }

    #[test]
    fn env_url_switches_to_http() {
        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[
            (ENV_EMBEDDING_URL, "http://localhost:8000/v1"),
            (ENV_EMBEDDING_MODEL, "bge-small"),
        ]));

        assert_eq!(config.embedding.provider, ProviderKind::Http);
        assert_eq!(config.embedding.base_url, "http://localhost:8000/v1");
        assert_eq!(config.embedding.model, "bge-small");
    }

    #[test]
    fn api_key_falls_back_to_openai_variable() {
        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[(ENV_OPENAI_API_KEY, "sk-fallback")]));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-fallback"));

        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[
            (ENV_OPENAI_API_KEY, "sk-fallback"),
            (ENV_EMBEDDING_API_KEY, "sk-primary"),
        ]));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-primary"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[(ENV_EMBEDDING_URL, "")]));
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
    }

    #[test]
    fn api_key_is_not_serialized() {
        let mut config = EngineConfig::default();
        config.embedding.api_key = Some("sk-secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn builds_configured_provider() {
        let config = EmbeddingConfig {
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let provider = config.build_provider().unwrap();
        assert_eq!(provider.model_id(), "hashing-v1-d32");
        assert_eq!(provider.dimension(), 32);
    }
}
