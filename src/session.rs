use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use crate::{
    chunking::Chunker,
    config::EngineConfig,
    document::Document,
    embedding::{EmbeddingProvider, embed_all},
    error::{Error, Result},
    fingerprint::fingerprint,
    index_store::{IndexStore, Manifest},
    retriever::{Passage, Retriever},
    sections::SectionMap,
    vector_index::{IndexEntry, VectorIndex},
};

/// An open index store plus the index currently being served.
///
/// Readers take a cheap [`Arc`] snapshot of the current index; a rebuild
/// constructs and persists a complete new index before swapping it in, so
/// a query sees either the old index or the new one, never a mix. A failed
/// build leaves the previous index in place.
pub struct Session {
    store: IndexStore,
    provider: Box<dyn EmbeddingProvider>,
    config: EngineConfig,
    chunker: Chunker,
    current: RwLock<Option<Arc<VectorIndex>>>,
    build_lock: Mutex<()>,
}

impl Session {
    /// Open (or create) the store at `store_path`.
    ///
    /// No index is served until [`load`](Self::load), [`build`](Self::build)
    /// or [`open_or_build`](Self::open_or_build) succeeds.
    pub fn open(
        store_path: &Path,
        config: EngineConfig,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking)?;
        let store = IndexStore::open(store_path)?;

        tracing::debug!(
            path = %store_path.display(),
            collection = %config.collection,
            model = provider.model_id(),
            "opened session"
        );

        Ok(Self {
            store,
            provider,
            config,
            chunker,
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
        })
    }

    /// Release the store. Outstanding snapshots stay usable.
    pub fn close(self) {
        tracing::debug!(collection = %self.config.collection, "closing session");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Fingerprint a build of `document` would carry under this session.
    pub fn fingerprint_for(&self, document: &Document) -> String {
        fingerprint(
            document,
            &self.config.chunking,
            self.provider.model_id(),
            self.provider.dimension(),
        )
    }

    /// Load the persisted index for `document`.
    ///
    /// Returns `Ok(false)` when nothing has been built yet and
    /// [`Error::FingerprintMismatch`] when the stored index is stale. Neither
    /// case touches the index currently served.
    pub fn load(&self, document: &Document) -> Result<bool> {
        // Serialised with builds so an older stored index never replaces a
        // newer one that a build has just published.
        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let expected = self.fingerprint_for(document);
        match self.store.load(&self.config.collection, &expected)? {
            Some(index) => {
                tracing::info!(
                    collection = %self.config.collection,
                    entries = index.len(),
                    "loaded index"
                );
                self.install(Arc::new(index));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Chunk, embed, persist and publish a fresh index for `document`.
    pub fn build(&self, document: &Document) -> Result<Arc<VectorIndex>> {
        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let chunks = self.chunker.split(document);
        tracing::info!(
            document = document.id(),
            chunks = chunks.len(),
            "building index"
        );

        let sections = SectionMap::new(document.text());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_all(
            self.provider.as_ref(),
            &texts,
            self.config.embedding.batch_size,
            &self.config.retry,
        )
        .inspect_err(|e| tracing::warn!("index build aborted: {e}"))?;

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut metadata = BTreeMap::new();
                metadata.insert("document_id".to_string(), chunk.document_id.clone());
                if let Some(page) = chunk.page {
                    metadata.insert("page".to_string(), page.to_string());
                }
                if let Some(section) = sections.section_for(chunk.start, chunk.end) {
                    metadata.insert("section".to_string(), section.to_string());
                }
                IndexEntry {
                    chunk,
                    embedding,
                    metadata,
                }
            })
            .collect();

        let index = VectorIndex::build(
            self.fingerprint_for(document),
            self.provider.dimension(),
            entries,
        )?;

        let manifest = Manifest::for_index(
            &self.config.collection,
            document.id(),
            self.provider.model_id(),
            self.config.chunking,
            &index,
        );
        self.store.save(&manifest, &index)?;

        let index = Arc::new(index);
        self.install(Arc::clone(&index));
        tracing::info!(
            collection = %self.config.collection,
            entries = index.len(),
            "index ready"
        );
        Ok(index)
    }

    /// Serve the stored index if it matches `document`, rebuilding otherwise.
    pub fn open_or_build(&self, document: &Document) -> Result<Arc<VectorIndex>> {
        match self.load(document) {
            Ok(true) => self.snapshot(),
            Ok(false) => {
                tracing::info!(
                    collection = %self.config.collection,
                    "no stored index, building"
                );
                self.build(document)
            }
            Err(Error::FingerprintMismatch { .. }) => {
                tracing::info!(
                    collection = %self.config.collection,
                    "stored index is stale, rebuilding"
                );
                self.build(document)
            }
            Err(e) => Err(e),
        }
    }

    /// The index currently served.
    pub fn snapshot(&self) -> Result<Arc<VectorIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::IndexNotBuilt {
                collection: self.config.collection.clone(),
            })
    }

    /// A retriever bound to the current snapshot.
    pub fn retriever(&self) -> Result<Retriever<'_>> {
        Ok(Retriever::new(
            self.provider.as_ref(),
            self.snapshot()?,
            &self.config.retrieval,
            &self.config.retry,
        ))
    }

    /// Retrieve passages for `query` from the current snapshot.
    pub fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<Passage>> {
        self.retriever()?.retrieve(query, k, threshold)
    }

    fn install(&self, index: Arc<VectorIndex>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("collection", &self.config.collection)
            .field("model", &self.provider.model_id())
            .finish_non_exhaustive()
    }
}
