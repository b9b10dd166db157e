use crate::{chunking::ChunkingConfig, document::Document};

/// Bumped whenever the stored layout or the chunking algorithm changes.
const FINGERPRINT_VERSION: &str = "manualseek-index-v1";

/// Identity of an index build.
///
/// Covers the document text and page layout, the chunking parameters and
/// the embedding model. Any change to these makes a stored index stale.
///
/// # Examples
///
/// ```
/// use manualseek::chunking::ChunkingConfig;
/// use manualseek::document::Document;
/// use manualseek::fingerprint::fingerprint;
///
/// let doc = Document::new("manual", "Check tire pressure monthly.");
/// let a = fingerprint(&doc, &ChunkingConfig::default(), "hashing-v1-d384", 384);
/// let b = fingerprint(&doc, &ChunkingConfig::default(), "text-embedding-3-small", 1536);
/// assert_eq!(a.len(), 64);
/// assert_ne!(a, b);
/// ```
pub fn fingerprint(
    document: &Document,
    chunking: &ChunkingConfig,
    model_id: &str,
    dimension: usize,
) -> String {
    let mut hasher = blake3::Hasher::new();

    update_field(&mut hasher, FINGERPRINT_VERSION.as_bytes());
    update_field(&mut hasher, document.id().as_bytes());
    update_field(&mut hasher, document.text().as_bytes());

    hasher.update(&(document.pages().len() as u64).to_le_bytes());
    for boundary in document.pages() {
        hasher.update(&(boundary.offset as u64).to_le_bytes());
        hasher.update(&boundary.page.to_le_bytes());
    }

    hasher.update(&(chunking.max_chunk_size as u64).to_le_bytes());
    hasher.update(&(chunking.overlap_size as u64).to_le_bytes());
    update_field(&mut hasher, model_id.as_bytes());
    hasher.update(&(dimension as u64).to_le_bytes());

    hasher.finalize().to_hex().to_string()
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
