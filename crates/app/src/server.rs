use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bangla_rag_core::{
    evaluate, Answer, Embedder, EvalItem, EvalReport, EvaluationError, Generator, RagService,
    SearchError, VectorIndex,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const STATUS_MESSAGE: &str =
    "Strict Bangla RAG API with noun/entity-aware retrieval and LLM extraction.";

pub type Service = RagService<Box<dyn Embedder>, Box<dyn VectorIndex>, Box<dyn Generator>>;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub items: Vec<EvalItem>,
}

pub fn router(service: Arc<Service>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/ask", post(ask))
        .route("/evaluate", post(evaluate_items))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn status() -> Json<Value> {
    Json(json!({ "message": STATUS_MESSAGE }))
}

async fn ask(
    State(service): State<Arc<Service>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    Ok(Json(service.ask(&request.query).await?))
}

async fn evaluate_items(
    State(service): State<Arc<Service>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvalReport>, ApiError> {
    Ok(Json(evaluate(&*service, &request.items).await?))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<SearchError> for ApiError {
    fn from(source: SearchError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: source.to_string(),
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(source: EvaluationError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: source.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bangla_rag_core::{
        build_index, CharacterNgramEmbedder, ChunkStore, HybridRetriever, InMemoryVectorIndex,
        LexicalScorer, OllamaGenerator, RetrievalOptions, NO_ANSWER_SENTINEL,
    };
    use std::time::Duration;

    // Nothing listens on the discard port, so every generation call fails fast.
    async fn service() -> Arc<Service> {
        let store = ChunkStore::new(vec![
            "অনুপমের মামা তার ভাগ্যদেবতা".to_string(),
            "অন্য একটি তথ্য".to_string(),
        ]);
        let embedder: Box<dyn Embedder> = Box::new(CharacterNgramEmbedder::default());
        let index: Box<dyn VectorIndex> = Box::new(InMemoryVectorIndex::new());
        build_index(&store, &embedder, &index, 32)
            .await
            .expect("in-memory index builds");

        let generator: Box<dyn Generator> = Box::new(
            OllamaGenerator::new("http://127.0.0.1:9", "llama3", Duration::from_secs(2))
                .expect("valid generator endpoint"),
        );
        let retriever = HybridRetriever::new(
            Arc::new(store),
            LexicalScorer::new().expect("entity pattern compiles"),
            embedder,
            index,
            RetrievalOptions::default(),
        );
        Arc::new(RagService::new(retriever, generator))
    }

    #[tokio::test]
    async fn status_reports_static_message() {
        let Json(body) = status().await;
        assert_eq!(body["message"], STATUS_MESSAGE);
    }

    #[tokio::test]
    async fn ask_returns_contexts_and_sentinel_when_generation_is_down() {
        let response = ask(
            State(service().await),
            Json(AskRequest {
                query: "মামা ভাগ্যদেবতা".to_string(),
            }),
        )
        .await;

        let Ok(Json(answer)) = response else {
            panic!("ask should degrade, not fail");
        };
        assert_eq!(answer.answer, NO_ANSWER_SENTINEL);
        assert_eq!(answer.contexts[0], "অনুপমের মামা তার ভাগ্যদেবতা");
        assert_eq!(answer.contexts.len(), 2);
    }

    #[tokio::test]
    async fn blank_query_gets_nearest_chunks() {
        let response = ask(
            State(service().await),
            Json(AskRequest {
                query: "   ".to_string(),
            }),
        )
        .await;

        let Ok(Json(answer)) = response else {
            panic!("blank query should fall back to the vector index");
        };
        assert_eq!(answer.answer, NO_ANSWER_SENTINEL);
        assert_eq!(answer.contexts.len(), 2);
    }

    #[tokio::test]
    async fn evaluation_surfaces_generation_outage_as_bad_gateway() {
        let response = evaluate_items(
            State(service().await),
            Json(EvaluateRequest {
                items: vec![EvalItem {
                    query: "মামা ভাগ্যদেবতা".to_string(),
                    expected_answer: "মামা".to_string(),
                }],
            }),
        )
        .await;

        let Err(error) = response else {
            panic!("evaluation must not score a failed generation");
        };
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert!(error.message.contains("item 0"));
    }

    #[test]
    fn backend_failures_map_to_bad_gateway() {
        let error = ApiError::from(SearchError::Embedding("model unavailable".to_string()));
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert!(error.message.contains("model unavailable"));
    }
}
