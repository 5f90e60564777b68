use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError};
use crate::store::ChunkStore;
use crate::traits::{IndexedChunk, VectorIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_EMBED_BATCH: usize = 32;
pub const MANIFEST_FILE: &str = "index_manifest.json";

/// Records which chunk store an index was built from, so a later process can
/// tell when the two have drifted apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub collection: String,
    pub chunk_count: usize,
    pub store_fingerprint: String,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn for_store(store: &ChunkStore, collection: impl Into<String>, dimensions: usize) -> Self {
        Self {
            collection: collection.into(),
            chunk_count: store.len(),
            store_fingerprint: store.fingerprint(),
            dimensions,
            built_at: Utc::now(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, IngestError> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Default manifest location: beside the chunk store file.
pub fn manifest_path(store_path: &Path) -> PathBuf {
    store_path
        .parent()
        .map(|parent| parent.join(MANIFEST_FILE))
        .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Consistent,
    Missing,
    Unreadable(String),
    Mismatch { expected: String, found: String },
}

/// Compares the manifest with the loaded store. Drift is logged, never fatal.
pub fn verify_manifest(store: &ChunkStore, path: &Path) -> ManifestStatus {
    if !path.exists() {
        warn!(manifest = %path.display(), "no index manifest, cannot confirm index matches chunk store");
        return ManifestStatus::Missing;
    }

    let manifest = match IndexManifest::read(path) {
        Ok(manifest) => manifest,
        Err(error) => {
            warn!(manifest = %path.display(), %error, "index manifest unreadable");
            return ManifestStatus::Unreadable(error.to_string());
        }
    };

    let fingerprint = store.fingerprint();
    if manifest.store_fingerprint != fingerprint || manifest.chunk_count != store.len() {
        warn!(
            manifest = %path.display(),
            indexed_chunks = manifest.chunk_count,
            stored_chunks = store.len(),
            built_at = %manifest.built_at,
            "index was built from a different chunk store; rebuild it"
        );
        return ManifestStatus::Mismatch {
            expected: fingerprint,
            found: manifest.store_fingerprint,
        };
    }

    ManifestStatus::Consistent
}

/// Drops the index and refills it from the store, `batch_size` chunks per
/// embedding call.
pub async fn build_index<E, V>(
    store: &ChunkStore,
    embedder: &E,
    index: &V,
    batch_size: usize,
) -> Result<usize, SearchError>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    if batch_size == 0 {
        return Err(SearchError::Request("embedding batch size must be > 0".to_string()));
    }

    index.reset(embedder.dimensions()).await?;

    let mut indexed = 0;
    for (batch_number, batch) in store.chunks().chunks(batch_size).enumerate() {
        let vectors = embedder.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(SearchError::Embedding(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        let offset = batch_number * batch_size;
        let entries = batch
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| IndexedChunk {
                position: offset + index,
                vector,
                text: text.clone(),
            })
            .collect::<Vec<_>>();

        index.upsert(&entries).await?;
        indexed += entries.len();
    }

    info!(chunks = indexed, "vector index rebuilt");
    Ok(indexed)
}
