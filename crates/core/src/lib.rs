pub mod answer;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod generation;
pub mod http;
pub mod indexer;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod store;
pub mod stores;
pub mod traits;

pub use answer::RagService;
pub use embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EvaluationError, GenerationError, IngestError, SearchError};
pub use evaluation::{evaluate, EVAL_TOP_K};
pub use extractor::{
    LopdfExtractor, OcrEndpointConfig, OcrEndpointExtractor, PageExtractor, PageText,
    TesseractExtractor,
};
pub use generation::{build_prompt, Generation, Generator, OllamaGenerator, NO_ANSWER_SENTINEL};
pub use indexer::{
    build_index, manifest_path, verify_manifest, IndexManifest, ManifestStatus,
    DEFAULT_EMBED_BATCH,
};
pub use ingest::{ingest_document, run_ingestion, IngestionReport};
pub use lexical::LexicalScorer;
pub use models::{
    Answer, EvalItem, EvalRecord, EvalReport, NormalizerOptions, PageRange, Relevance,
    RetrievalOptions, RetrievedChunk, Retrieval, ScoredChunk, SearchMode, DEFAULT_MIN_CHUNK_CHARS,
    DEFAULT_TOP_K,
};
pub use normalizer::{Normalizer, WatermarkFilter};
pub use orchestrator::HybridRetriever;
pub use store::{ChunkStore, CHUNK_DELIMITER};
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::{IndexedChunk, VectorIndex};
