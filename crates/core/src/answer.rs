use crate::embeddings::Embedder;
use crate::error::{GenerationError, SearchError};
use crate::generation::{build_prompt, Generation, Generator, NO_ANSWER_SENTINEL};
use crate::models::{Answer, Retrieval};
use crate::orchestrator::HybridRetriever;
use crate::traits::VectorIndex;
use tracing::warn;

/// Retrieval plus answer extraction; the process-wide context behind `/ask`
/// and `/evaluate`.
pub struct RagService<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    retriever: HybridRetriever<E, V>,
    generator: G,
}

impl<E, V, G> RagService<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    pub fn new(retriever: HybridRetriever<E, V>, generator: G) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval, SearchError> {
        self.retriever.retrieve(query, top_k).await
    }

    /// Raw generation for an already retrieved context; failures surface.
    pub async fn generate(
        &self,
        query: &str,
        contexts: &[String],
    ) -> Result<Generation, GenerationError> {
        self.generator.generate(&build_prompt(query, contexts)).await
    }

    /// Answers with the default `top_k`. Retrieval failures are returned to
    /// the caller; a generation failure degrades to the sentinel answer.
    pub async fn ask(&self, query: &str) -> Result<Answer, SearchError> {
        let contexts = self
            .retrieve(query, self.retriever.default_top_k())
            .await?
            .texts();

        let answer = match self.generate(query, &contexts).await {
            Ok(generation) => generation.into_answer(),
            Err(error) => {
                warn!(%error, "generation failed, answering with sentinel");
                NO_ANSWER_SENTINEL.to_string()
            }
        };

        Ok(Answer { answer, contexts })
    }
}
