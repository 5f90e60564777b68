use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::lexical::LexicalScorer;
use crate::models::{RetrievalOptions, Retrieval, RetrievedChunk, SearchMode};
use crate::store::ChunkStore;
use crate::traits::VectorIndex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Query-time retrieval context: the chunk store plus the embedding and index
/// handles, built once and shared read-only between requests.
pub struct HybridRetriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    store: Arc<ChunkStore>,
    scorer: LexicalScorer,
    embedder: E,
    index: V,
    options: RetrievalOptions,
}

impl<E, V> HybridRetriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(
        store: Arc<ChunkStore>,
        scorer: LexicalScorer,
        embedder: E,
        index: V,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            store,
            scorer,
            embedder,
            index,
            options,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.options.top_k
    }

    /// Lexically scored chunks first, then nearest neighbours from the vector
    /// index to fill the remaining `top_k` slots. Never returns more than
    /// `top_k` hits or the same text twice.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval, SearchError> {
        let keywords = self.scorer.extract_keywords(query);
        let mut retrieval = Retrieval {
            query: query.to_string(),
            keywords: keywords.clone(),
            hits: Vec::new(),
        };

        for scored in self.scorer.rank(&self.store, &keywords) {
            if retrieval.len() >= top_k || scored.score == 0 {
                break;
            }
            if retrieval.contains_text(scored.text) {
                continue;
            }
            retrieval.hits.push(RetrievedChunk {
                text: scored.text.to_string(),
                mode: SearchMode::Keyword,
                lexical_score: Some(scored.score),
            });
        }
        let lexical_count = retrieval.len();

        if lexical_count < top_k {
            let wanted = top_k - lexical_count;
            let query_vector = with_timeout(
                "embedding",
                self.options.embed_timeout,
                self.embedder.embed(query),
            )
            .await?;
            let nearest = with_timeout(
                "vector query",
                self.options.index_timeout,
                self.index.query(&query_vector, wanted),
            )
            .await?;

            for text in nearest {
                if retrieval.len() >= top_k {
                    break;
                }
                if !retrieval.contains_text(&text) {
                    retrieval.hits.push(RetrievedChunk {
                        text,
                        mode: SearchMode::Vector,
                        lexical_score: None,
                    });
                }
            }
            debug!(wanted, added = retrieval.len() - lexical_count, "vector fallback");
        }

        info!(
            keywords = keywords.len(),
            lexical = lexical_count,
            total = retrieval.len(),
            top_k,
            "retrieved chunks"
        );
        Ok(retrieval)
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, SearchError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| SearchError::Timeout {
            operation,
            millis: limit.as_millis() as u64,
        })?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::InMemoryVectorIndex;
    use crate::traits::IndexedChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed list of texts and counts how often it was asked.
    #[derive(Default)]
    pub(crate) struct FakeVectorIndex {
        pub hits: Vec<String>,
        pub calls: AtomicUsize,
        pub requested: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn reset(&self, _dimensions: usize) -> Result<(), SearchError> {
            Ok(())
        }

        async fn upsert(&self, _entries: &[IndexedChunk]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<String>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.store(k, Ordering::SeqCst);
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    pub(crate) struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, SearchError> {
            Err(SearchError::Embedding("model server is down".to_string()))
        }
    }

    struct StalledIndex;

    #[async_trait]
    impl VectorIndex for StalledIndex {
        async fn reset(&self, _dimensions: usize) -> Result<(), SearchError> {
            Ok(())
        }

        async fn upsert(&self, _entries: &[IndexedChunk]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<String>, SearchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn store(chunks: &[&str]) -> Arc<ChunkStore> {
        Arc::new(ChunkStore::new(
            chunks.iter().map(|chunk| (*chunk).to_string()).collect(),
        ))
    }

    fn scorer() -> LexicalScorer {
        LexicalScorer::new().expect("entity pattern compiles")
    }

    fn retriever<V: VectorIndex>(
        chunks: &[&str],
        index: V,
    ) -> HybridRetriever<CharacterNgramEmbedder, V> {
        HybridRetriever::new(
            store(chunks),
            scorer(),
            CharacterNgramEmbedder::default(),
            index,
            RetrievalOptions::default(),
        )
    }

    fn fake(hits: &[&str]) -> FakeVectorIndex {
        FakeVectorIndex {
            hits: hits.iter().map(|hit| (*hit).to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lexical_hits_come_before_vector_hits() -> Result<(), SearchError> {
        let retriever = retriever(
            &["অনুপমের মামা তার ভাগ্যদেবতা", "অন্য একটি তথ্য"],
            fake(&["অন্য একটি তথ্য", "অনুপমের মামা তার ভাগ্যদেবতা"]),
        );

        let result = retriever.retrieve("মামা ভাগ্যদেবতা", 5).await?;

        assert_eq!(result.keywords, vec!["মামা", "ভাগ্যদেবতা"]);
        assert_eq!(
            result.texts(),
            vec!["অনুপমের মামা তার ভাগ্যদেবতা", "অন্য একটি তথ্য"]
        );
        assert_eq!(result.hits[0].mode, SearchMode::Keyword);
        assert_eq!(result.hits[0].lexical_score, Some(1));
        assert_eq!(result.hits[1].mode, SearchMode::Vector);
        Ok(())
    }

    #[tokio::test]
    async fn fallback_asks_only_for_missing_slots() -> Result<(), SearchError> {
        let index = fake(&["v1", "v2", "v3", "v4", "v5"]);
        let retriever = retriever(&["সুপুরুষ বটে প্রথম", "সুপুরুষ বটে দ্বিতীয়", "অন্য"], index);

        let result = retriever.retrieve("সুপুরুষ", 5).await?;

        assert_eq!(retriever.index.requested.load(Ordering::SeqCst), 3);
        assert_eq!(result.len(), 5);
        assert_eq!(result.texts()[2..], ["v1", "v2", "v3"]);
        Ok(())
    }

    #[tokio::test]
    async fn full_lexical_set_skips_the_index() -> Result<(), SearchError> {
        let retriever = retriever(&["সুপুরুষ এক", "সুপুরুষ দুই", "সুপুরুষ তিন"], fake(&["v1"]));

        let result = retriever.retrieve("সুপুরুষ", 2).await?;

        assert_eq!(result.texts(), vec!["সুপুরুষ এক", "সুপুরুষ দুই"]);
        assert_eq!(retriever.index.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn stopword_query_relies_entirely_on_vectors() -> Result<(), SearchError> {
        let retriever = retriever(&["সুপুরুষ এক", "সুপুরুষ দুই"], fake(&["সুপুরুষ দুই"]));

        let result = retriever.retrieve("কে কি কার", 5).await?;

        assert!(result.keywords.is_empty());
        assert_eq!(retriever.index.requested.load(Ordering::SeqCst), 5);
        assert_eq!(result.texts(), vec!["সুপুরুষ দুই"]);
        assert!(result.hits.iter().all(|hit| hit.mode == SearchMode::Vector));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_vector_hits_are_dropped() -> Result<(), SearchError> {
        let retriever = retriever(
            &["সুপুরুষ এক", "অন্য দুই"],
            fake(&["সুপুরুষ এক", "অন্য দুই", "সুপুরুষ এক"]),
        );

        let result = retriever.retrieve("সুপুরুষ", 4).await?;
        let texts = result.texts();

        assert_eq!(texts, vec!["সুপুরুষ এক", "অন্য দুই"]);
        Ok(())
    }

    #[tokio::test]
    async fn small_store_is_not_padded() -> Result<(), SearchError> {
        let chunks = ["শম্ভুনাথবাবু সুপুরুষ বটে", "অন্য একটি তথ্য"];
        let index = InMemoryVectorIndex::new();
        let embedder = CharacterNgramEmbedder::default();
        index.reset(embedder.dimensions()).await?;
        let entries = chunks
            .iter()
            .enumerate()
            .map(|(position, text)| IndexedChunk {
                position,
                vector: embedder.embed_text(text),
                text: (*text).to_string(),
            })
            .collect::<Vec<_>>();
        index.upsert(&entries).await?;

        let retriever = retriever(&chunks, index);
        let result = retriever.retrieve("সুপুরুষ", 5).await?;

        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].lexical_score, Some(2));
        assert_eq!(result.texts()[1], "অন্য একটি তথ্য");
        Ok(())
    }

    #[tokio::test]
    async fn zero_top_k_returns_nothing() -> Result<(), SearchError> {
        let retriever = retriever(&["সুপুরুষ এক"], fake(&["v1"]));
        let result = retriever.retrieve("সুপুরুষ", 0).await?;
        assert!(result.is_empty());
        assert_eq!(retriever.index.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn blank_query_falls_back_to_vectors() -> Result<(), SearchError> {
        let retriever = retriever(&["সুপুরুষ এক", "অন্য একটি তথ্য"], fake(&["অন্য একটি তথ্য"]));

        for query in ["", "   ", "কে কি"] {
            let result = retriever.retrieve(query, 5).await?;
            assert!(result.keywords.is_empty(), "query: {query:?}");
            assert_eq!(result.texts(), vec!["অন্য একটি তথ্য"], "query: {query:?}");
            assert!(result.hits.iter().all(|hit| hit.mode == SearchMode::Vector));
        }
        assert_eq!(retriever.index.calls.load(Ordering::SeqCst), 3);
        assert_eq!(retriever.index.requested.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let retriever = HybridRetriever::new(
            store(&["অন্য একটি তথ্য"]),
            scorer(),
            FailingEmbedder,
            fake(&["অন্য একটি তথ্য"]),
            RetrievalOptions::default(),
        );

        let result = retriever.retrieve("সুপুরুষ", 5).await;

        assert!(matches!(result, Err(SearchError::Embedding(_))));
    }

    #[tokio::test]
    async fn stalled_index_times_out() {
        let options = RetrievalOptions {
            index_timeout: Duration::from_millis(50),
            ..RetrievalOptions::default()
        };
        let retriever = HybridRetriever::new(
            store(&["অন্য একটি তথ্য"]),
            scorer(),
            CharacterNgramEmbedder::default(),
            StalledIndex,
            options,
        );

        let result = retriever.retrieve("সুপুরুষ", 5).await;

        assert!(matches!(
            result,
            Err(SearchError::Timeout {
                operation: "vector query",
                millis: 50
            })
        ));
    }
}
