use crate::error::SearchError;
use crate::traits::{IndexedChunk, VectorIndex};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Brute-force cosine index held in process memory. Rebuilt at startup from
/// the chunk store when no external index is configured.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    dimensions: RwLock<Option<usize>>,
    entries: RwLock<BTreeMap<usize, IndexedChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn reset(&self, dimensions: usize) -> Result<(), SearchError> {
        *self.dimensions.write().await = Some(dimensions);
        self.entries.write().await.clear();
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexedChunk]) -> Result<(), SearchError> {
        // A batch is written whole or not at all.
        if let Some(dimensions) = *self.dimensions.read().await {
            if let Some(bad) = entries.iter().find(|entry| entry.vector.len() != dimensions) {
                return Err(SearchError::Request(format!(
                    "embedding dimension {} != {dimensions} at position {}",
                    bad.vector.len(),
                    bad.position
                )));
            }
        }

        let mut stored = self.entries.write().await;
        for entry in entries {
            stored.insert(entry.position, entry.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<String>, SearchError> {
        let stored = self.entries.read().await;
        let mut scored = stored
            .values()
            .map(|entry| (cosine(vector, &entry.vector), entry))
            .collect::<Vec<_>>();

        scored.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .partial_cmp(left_score)
                .unwrap_or(Ordering::Equal)
                .then(left.position.cmp(&right.position))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, entry)| entry.text.clone())
            .collect())
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
