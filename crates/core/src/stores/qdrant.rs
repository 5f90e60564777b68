use crate::error::SearchError;
use crate::traits::{IndexedChunk, VectorIndex};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const UPSERT_BATCH: usize = 64;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            vector_size,
        })
    }

    fn url(&self, suffix: &str) -> Result<Url, SearchError> {
        let path = format!("collections/{}{suffix}", self.collection);
        Ok(crate::http::endpoint(&self.endpoint, &path)?)
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), SearchError> {
        if actual != self.vector_size {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {}",
                actual, self.vector_size
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn reset(&self, dimensions: usize) -> Result<(), SearchError> {
        self.check_dimensions(dimensions)?;

        let response = self.client.delete(self.url("")?).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("drop collection: {}", response.status()),
            });
        }

        let response = self
            .client
            .put(self.url("")?)
            .json(&json!({
                "vectors": {
                    "size": dimensions,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("create collection: {}", response.status()),
            });
        }

        info!(collection = %self.collection, dimensions, "recreated qdrant collection");
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexedChunk]) -> Result<(), SearchError> {
        for batch in entries.chunks(UPSERT_BATCH) {
            let points = batch
                .iter()
                .map(|entry| {
                    self.check_dimensions(entry.vector.len())?;
                    Ok(json!({
                        "id": entry.position,
                        "vector": entry.vector,
                        "payload": {
                            "chunk_id": entry.id(),
                            "position": entry.position,
                            "text": entry.text,
                        },
                    }))
                })
                .collect::<Result<Vec<_>, SearchError>>()?;

            let response = self
                .client
                .put(self.url("/points?wait=true")?)
                .json(&json!({ "points": points }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SearchError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: response.status().to_string(),
                });
            }
            debug!(points = batch.len(), "upserted qdrant batch");
        }

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<String>, SearchError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(vector.len())?;

        let response = self
            .client
            .post(self.url("/points/search")?)
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(search_hit_texts(&parsed))
    }
}

fn search_hit_texts(parsed: &Value) -> Vec<String> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .filter_map(|hit| {
            let text = hit.pointer("/payload/text").and_then(Value::as_str);
            if text.is_none() {
                warn!(id = ?hit.pointer("/id"), "qdrant hit without text payload");
            }
            text.map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hits_keep_order_and_skip_missing_text() {
        let parsed = json!({
            "result": [
                {"id": 3, "score": 0.91, "payload": {"chunk_id": "chunk_3", "text": "third"}},
                {"id": 7, "score": 0.80, "payload": {"chunk_id": "chunk_7"}},
                {"id": 1, "score": 0.52, "payload": {"chunk_id": "chunk_1", "text": "first"}}
            ]
        });

        assert_eq!(search_hit_texts(&parsed), vec!["third", "first"]);
    }

    #[test]
    fn malformed_search_body_yields_no_hits() {
        assert!(search_hit_texts(&json!({"status": "error"})).is_empty());
    }

    #[test]
    fn collection_urls_are_scoped() -> Result<(), SearchError> {
        let store = QdrantStore::new("http://localhost:6333", "hsc26_chunks", 4, Duration::from_secs(1))?;
        assert_eq!(
            store.url("/points/search")?.as_str(),
            "http://localhost:6333/collections/hsc26_chunks/points/search"
        );
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_query_vector_is_rejected_before_any_request() -> Result<(), SearchError> {
        let store = QdrantStore::new("http://127.0.0.1:9", "hsc26_chunks", 4, Duration::from_secs(1))?;
        let result = store.query(&[0.0, 1.0], 3).await;
        assert!(matches!(result, Err(SearchError::Request(_))));
        Ok(())
    }
}
