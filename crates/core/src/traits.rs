use crate::error::SearchError;
use async_trait::async_trait;

/// One chunk ready to be written into a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub position: usize,
    pub vector: Vec<f32>,
    pub text: String,
}

impl IndexedChunk {
    pub fn id(&self) -> String {
        crate::store::chunk_id(self.position)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drops every stored entry so the index can be rebuilt from scratch.
    async fn reset(&self, dimensions: usize) -> Result<(), SearchError>;

    async fn upsert(&self, entries: &[IndexedChunk]) -> Result<(), SearchError>;

    /// Texts of the `k` nearest entries, nearest first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<String>, SearchError>;
}

#[async_trait]
impl VectorIndex for Box<dyn VectorIndex> {
    async fn reset(&self, dimensions: usize) -> Result<(), SearchError> {
        (**self).reset(dimensions).await
    }

    async fn upsert(&self, entries: &[IndexedChunk]) -> Result<(), SearchError> {
        (**self).upsert(entries).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<String>, SearchError> {
        (**self).query(vector, k).await
    }
}
