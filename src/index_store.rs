use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, TableError,
};
use serde::{Deserialize, Serialize};

use crate::{
    chunking::{Chunk, ChunkingConfig},
    error::{Error, Result},
    vector_index::{IndexEntry, Metadata, VectorIndex},
};

const MANIFESTS: TableDefinition<&str, &str> = TableDefinition::new("manifests");

/// Header size: 4 bytes dimension.
const VECTOR_HEADER_SIZE: usize = 4;

fn chunk_table(name: &str) -> TableDefinition<'_, u64, &'static str> {
    TableDefinition::new(name)
}

fn vector_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

fn chunk_table_name(collection: &str) -> String {
    format!("chunks:{collection}")
}

fn vector_table_name(collection: &str) -> String {
    format!("vectors:{collection}")
}

/// Summary of a persisted build, stored as JSON in the `manifests` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub collection: String,
    pub fingerprint: String,
    pub document_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub entry_count: usize,
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    /// Seconds since the Unix epoch.
    pub built_at: u64,
}

impl Manifest {
    /// Describe `index` as a build of `collection`, timestamped now.
    pub fn for_index(
        collection: &str,
        document_id: &str,
        model_id: &str,
        chunking: ChunkingConfig,
        index: &VectorIndex,
    ) -> Self {
        let built_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            collection: collection.to_string(),
            fingerprint: index.fingerprint().to_string(),
            document_id: document_id.to_string(),
            model_id: model_id.to_string(),
            dimension: index.dimension(),
            entry_count: index.len(),
            max_chunk_size: chunking.max_chunk_size,
            overlap_size: chunking.overlap_size,
            built_at,
        }
    }
}

#[derive(Serialize)]
struct StoredChunkRef<'a> {
    chunk: &'a Chunk,
    metadata: &'a Metadata,
}

#[derive(Deserialize)]
struct StoredChunk {
    chunk: Chunk,
    #[serde(default)]
    metadata: Metadata,
}

/// Persists vector indexes as named collections in one redb file.
///
/// Each collection has a manifest entry plus a `chunks:{name}` table of
/// JSON chunk records and a `vectors:{name}` table of embeddings:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    /// Open or create an index store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use manualseek::IndexStore;
    ///
    /// let store = IndexStore::open(&tmp.path().join("index.redb")).unwrap();
    /// assert!(store.list_manifests().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(MANIFESTS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Replace everything stored for `manifest.collection` with `index`.
    ///
    /// The old entries, the new entries and the manifest are all written in
    /// one transaction; readers see either the previous build or this one.
    pub fn save(&self, manifest: &Manifest, index: &VectorIndex) -> Result<()> {
        if manifest.fingerprint != index.fingerprint()
            || manifest.entry_count != index.len()
            || manifest.dimension != index.dimension()
        {
            return Err(Error::CorruptIndex(format!(
                "manifest for '{}' does not describe the index being saved",
                manifest.collection
            )));
        }

        let chunks_name = chunk_table_name(&manifest.collection);
        let vectors_name = vector_table_name(&manifest.collection);
        let manifest_json = serde_json::to_string(manifest)?;

        let txn = self.db.begin_write()?;
        {
            txn.delete_table(chunk_table(&chunks_name))?;
            txn.delete_table(vector_table(&vectors_name))?;

            let mut chunks = txn.open_table(chunk_table(&chunks_name))?;
            let mut vectors = txn.open_table(vector_table(&vectors_name))?;

            for (seq, entry) in index.entries().iter().enumerate() {
                let record = serde_json::to_string(&StoredChunkRef {
                    chunk: &entry.chunk,
                    metadata: &entry.metadata,
                })?;
                chunks.insert(seq as u64, record.as_str())?;

                let data = entry.embedding.as_slice();
                let byte_len = VECTOR_HEADER_SIZE + std::mem::size_of_val(data);
                let mut guard = vectors.insert_reserve(seq as u64, byte_len)?;
                let dest = guard.as_mut();
                dest[0..VECTOR_HEADER_SIZE]
                    .copy_from_slice(&(data.len() as u32).to_le_bytes());
                dest[VECTOR_HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(data));
            }

            let mut manifests = txn.open_table(MANIFESTS)?;
            manifests.insert(manifest.collection.as_str(), manifest_json.as_str())?;
        }
        txn.commit()?;

        tracing::debug!(
            collection = %manifest.collection,
            entries = manifest.entry_count,
            "saved index"
        );
        Ok(())
    }

    /// Load the index for `collection` if it was built for `expected_fingerprint`.
    ///
    /// Returns `Ok(None)` when nothing was ever saved for the collection and
    /// [`Error::FingerprintMismatch`] when the stored build is stale.
    pub fn load(
        &self,
        collection: &str,
        expected_fingerprint: &str,
    ) -> Result<Option<VectorIndex>> {
        let txn = self.db.begin_read()?;

        let manifest = {
            let table = txn.open_table(MANIFESTS)?;
            let Some(guard) = table.get(collection)? else {
                return Ok(None);
            };
            serde_json::from_str::<Manifest>(guard.value())?
        };

        if manifest.fingerprint != expected_fingerprint {
            return Err(Error::FingerprintMismatch {
                collection: collection.to_string(),
                stored: manifest.fingerprint,
                expected: expected_fingerprint.to_string(),
            });
        }

        let chunks_name = chunk_table_name(collection);
        let vectors_name = vector_table_name(collection);
        let chunks = open_existing(txn.open_table(chunk_table(&chunks_name)), collection)?;
        let vectors =
            open_existing(txn.open_table(vector_table(&vectors_name)), collection)?;

        let mut entries = Vec::with_capacity(manifest.entry_count);
        for row in chunks.iter()? {
            let (seq, record) = row?;
            let seq = seq.value();
            let stored: StoredChunk = serde_json::from_str(record.value())?;

            let Some(bytes) = vectors.get(seq)? else {
                return Err(Error::CorruptIndex(format!(
                    "collection '{collection}' has no vector for chunk {seq}"
                )));
            };
            let embedding = decode_vector(bytes.value()).ok_or_else(|| {
                Error::CorruptIndex(format!(
                    "collection '{collection}' has a malformed vector for chunk {seq}"
                ))
            })?;

            entries.push(IndexEntry {
                chunk: stored.chunk,
                embedding,
                metadata: stored.metadata,
            });
        }

        if entries.len() != manifest.entry_count {
            return Err(Error::CorruptIndex(format!(
                "collection '{collection}' has {} entries, manifest says {}",
                entries.len(),
                manifest.entry_count
            )));
        }

        VectorIndex::build(manifest.fingerprint, manifest.dimension, entries)
            .map(Some)
    }

    /// Remove a collection and all its entries.
    pub fn remove(&self, collection: &str) -> Result<bool> {
        let chunks_name = chunk_table_name(collection);
        let vectors_name = vector_table_name(collection);

        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(MANIFESTS)?;
            table.remove(collection)?.is_some()
        };
        txn.delete_table(chunk_table(&chunks_name))?;
        txn.delete_table(vector_table(&vectors_name))?;
        txn.commit()?;
        Ok(removed)
    }

    pub fn manifest(&self, collection: &str) -> Result<Option<Manifest>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MANIFESTS)?;
        match table.get(collection)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All manifests, ordered by collection name.
    pub fn list_manifests(&self) -> Result<Vec<Manifest>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MANIFESTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            result.push(serde_json::from_str(v.value())?);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore").finish_non_exhaustive()
    }
}

/// A manifest without its tables means the file was tampered with.
fn open_existing<T>(
    opened: std::result::Result<T, TableError>,
    collection: &str,
) -> Result<T> {
    match opened {
        Ok(table) => Ok(table),
        Err(TableError::TableDoesNotExist(name)) => Err(Error::CorruptIndex(
            format!("collection '{collection}' is missing table {name}"),
        )),
        Err(e) => Err(e.into()),
    }
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    let header: [u8; VECTOR_HEADER_SIZE] =
        bytes.get(..VECTOR_HEADER_SIZE)?.try_into().ok()?;
    let dimension = u32::from_le_bytes(header) as usize;
    let payload = &bytes[VECTOR_HEADER_SIZE..];
    if payload.len() != dimension * 4 {
        return None;
    }

    // Copy into an f32 buffer; the stored bytes carry no alignment guarantee.
    let mut data = vec![0.0f32; dimension];
    bytemuck::cast_slice_mut::<f32, u8>(&mut data).copy_from_slice(payload);
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&tmp.path().join("index.redb")).unwrap();
        (tmp, store)
    }

    fn entry(index: usize, text: &str, embedding: Vec<f32>) -> IndexEntry {
        let mut metadata = Metadata::new();
        metadata.insert("document_id".to_string(), "manual".to_string());
        IndexEntry {
            chunk: Chunk {
                document_id: "manual".to_string(),
                index,
                start: index * 5,
                end: index * 5 + text.chars().count(),
                text: text.to_string(),
                page: Some(index as u32 + 1),
            },
            embedding,
            metadata,
        }
    }

    fn sample_index(fp: &str) -> VectorIndex {
        VectorIndex::build(
            fp,
            3,
            vec![
                entry(0, "brake noise", vec![0.1, 0.2, 0.3]),
                entry(1, "oil change", vec![-1.0, 0.5, 0.25]),
            ],
        )
        .unwrap()
    }

    fn manifest(collection: &str, index: &VectorIndex) -> Manifest {
        Manifest::for_index(
            collection,
            "manual",
            "hashing-v1-d3",
            ChunkingConfig::default(),
            index,
        )
    }

    #[test]
    fn save_and_load() {
        let (_tmp, store) = test_store();
        let index = sample_index("fp-1");
        store.save(&manifest("manual", &index), &index).unwrap();

        let loaded = store.load("manual", "fp-1").unwrap().unwrap();
        assert_eq!(loaded.fingerprint(), "fp-1");
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.entries(), index.entries());
    }

    #[test]
    fn load_missing_returns_none() {
        let (_tmp, store) = test_store();
        assert!(store.load("manual", "fp").unwrap().is_none());
    }

    #[test]
    fn load_with_other_fingerprint_is_mismatch() {
        let (_tmp, store) = test_store();
        let index = sample_index("fp-old");
        store.save(&manifest("manual", &index), &index).unwrap();

        let err = store.load("manual", "fp-new").unwrap_err();
        match err {
            Error::FingerprintMismatch {
                collection,
                stored,
                expected,
            } => {
                assert_eq!(collection, "manual");
                assert_eq!(stored, "fp-old");
                assert_eq!(expected, "fp-new");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn save_replaces_previous_build() {
        let (_tmp, store) = test_store();
        let first = sample_index("fp-1");
        store.save(&manifest("manual", &first), &first).unwrap();

        let second = VectorIndex::build(
            "fp-2",
            3,
            vec![entry(0, "tire pressure", vec![0.0, 0.0, 1.0])],
        )
        .unwrap();
        store.save(&manifest("manual", &second), &second).unwrap();

        let loaded = store.load("manual", "fp-2").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].chunk.text, "tire pressure");
    }

    #[test]
    fn empty_index_round_trips() {
        let (_tmp, store) = test_store();
        let empty = VectorIndex::build("fp-empty", 3, Vec::new()).unwrap();
        store.save(&manifest("manual", &empty), &empty).unwrap();

        let loaded = store.load("manual", "fp-empty").unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn collections_are_independent() {
        let (_tmp, store) = test_store();
        let a = sample_index("fp-a");
        let b = sample_index("fp-b");
        store.save(&manifest("alpha", &a), &a).unwrap();
        store.save(&manifest("beta", &b), &b).unwrap();

        let names: Vec<_> = store
            .list_manifests()
            .unwrap()
            .into_iter()
            .map(|m| m.collection)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(store.remove("alpha").unwrap());
        assert!(!store.remove("alpha").unwrap());
        assert!(store.load("alpha", "fp-a").unwrap().is_none());
        assert!(store.load("beta", "fp-b").unwrap().is_some());
    }

    #[test]
    fn manifest_reports_build() {
        let (_tmp, store) = test_store();
        let index = sample_index("fp-1");
        store.save(&manifest("manual", &index), &index).unwrap();

        let m = store.manifest("manual").unwrap().unwrap();
        assert_eq!(m.entry_count, 2);
        assert_eq!(m.model_id, "hashing-v1-d3");
        assert_eq!(m.max_chunk_size, 1000);
        assert!(store.manifest("other").unwrap().is_none());
    }

    #[test]
    fn save_rejects_foreign_manifest() {
        let (_tmp, store) = test_store();
        let index = sample_index("fp-1");
        let other = sample_index("fp-2");

        let err = store.save(&manifest("manual", &other), &index).unwrap_err();
        assert!(matches!(err, Error::CorruptIndex(_)));
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        let index = sample_index("fp-1");

        {
            let store = IndexStore::open(&path).unwrap();
            store.save(&manifest("manual", &index), &index).unwrap();
        }

        {
            let store = IndexStore::open(&path).unwrap();
            let loaded = store.load("manual", "fp-1").unwrap().unwrap();
            assert_eq!(loaded.entries()[1].embedding, vec![-1.0, 0.5, 0.25]);
        }
    }

    #[test]
    fn decode_rejects_truncated_vectors() {
        assert!(decode_vector(&[1, 0]).is_none());
        assert!(decode_vector(&[2, 0, 0, 0, 0, 0, 0x80, 0x3f]).is_none());

        let mut ok = vec![1u8, 0, 0, 0];
        ok.extend_from_slice(&1.0f32.to_le_bytes());
        assert_eq!(decode_vector(&ok), Some(vec![1.0]));
    }
}
