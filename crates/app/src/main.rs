mod server;

use anyhow::{bail, Context};
use bangla_rag_core::{
    build_index, evaluate, manifest_path, run_ingestion, verify_manifest, CharacterNgramEmbedder,
    ChunkStore, Embedder, EvalItem, Generator, HybridRetriever, IndexManifest, InMemoryVectorIndex,
    LexicalScorer, LopdfExtractor, NormalizerOptions, OcrEndpointConfig, OcrEndpointExtractor,
    OllamaEmbedder, OllamaGenerator, PageExtractor, PageRange, QdrantStore, RagService,
    RetrievalOptions, TesseractExtractor, VectorIndex, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBED_BATCH,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use server::{EvaluateRequest, Service};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_OLLAMA_EMBED_DIMENSIONS: usize = 768;

#[derive(Parser)]
#[command(name = "bangla-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Chunk store file written by `extract` and read by everything else.
    #[arg(long, env = "RAG_CHUNKS", default_value = "vector_store/chunks.txt")]
    chunks: PathBuf,

    /// Index manifest; defaults to `index_manifest.json` beside the chunk store.
    #[arg(long, env = "RAG_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Embedding backend.
    #[arg(long, env = "RAG_EMBEDDER", value_enum, default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// Ollama base URL, used for embeddings and generation.
    #[arg(long, env = "RAG_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "RAG_EMBED_MODEL", default_value = "nomic-embed-text")]
    embed_model: String,

    /// Embedding vector size; defaults to the backend's usual size.
    #[arg(long, env = "RAG_EMBED_DIMENSIONS")]
    embed_dimensions: Option<usize>,

    /// Vector index backend.
    #[arg(long, env = "RAG_VECTOR_BACKEND", value_enum, default_value_t = VectorBackend::Memory)]
    vector_backend: VectorBackend,

    /// Qdrant base URL
    #[arg(long, env = "RAG_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "RAG_QDRANT_COLLECTION", default_value = "hsc26_chunks")]
    qdrant_collection: String,

    /// Ollama chat model used for answer extraction.
    #[arg(long, env = "RAG_LLM_MODEL", default_value = "llama3")]
    llm_model: String,

    /// Number of chunks handed to the model per question.
    #[arg(long, env = "RAG_TOP_K", default_value = "5")]
    top_k: usize,

    #[arg(long, env = "RAG_EMBED_TIMEOUT_SECS", default_value = "30")]
    embed_timeout_secs: u64,

    #[arg(long, env = "RAG_INDEX_TIMEOUT_SECS", default_value = "30")]
    index_timeout_secs: u64,

    #[arg(long, env = "RAG_GENERATION_TIMEOUT_SECS", default_value = "120")]
    generation_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the story pages from the PDF and write the chunk store.
    Extract {
        /// Source PDF.
        #[arg(long, env = "RAG_PDF", default_value = "data/HSC26-Bangla1st-Paper.pdf")]
        pdf: PathBuf,
        /// First page to keep (1-based, inclusive).
        #[arg(long, env = "RAG_FIRST_PAGE", default_value = "6")]
        first_page: u32,
        /// Last page to keep (inclusive).
        #[arg(long, env = "RAG_LAST_PAGE", default_value = "17")]
        last_page: u32,
        /// How page text is obtained.
        #[arg(long, env = "RAG_EXTRACTOR", value_enum, default_value_t = ExtractorKind::Tesseract)]
        extractor: ExtractorKind,
        /// Paragraphs at or below this many characters are dropped.
        #[arg(long, env = "RAG_MIN_CHUNK_CHARS", default_value = "30")]
        min_chunk_chars: usize,
    },
    /// Embed every chunk and rebuild the vector index.
    BuildIndex {
        #[arg(long, env = "RAG_EMBED_BATCH", default_value = "32")]
        batch_size: usize,
    },
    /// Answer one question.
    Ask {
        query: String,
    },
    /// Score the pipeline against a JSON file of `{query, expected_answer}` items.
    Evaluate {
        #[arg(long)]
        file: PathBuf,
        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Serve `/ask` and `/evaluate` over HTTP.
    Serve {
        #[arg(long, env = "RAG_ADDR", default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Ollama,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VectorBackend {
    Memory,
    Qdrant,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExtractorKind {
    Tesseract,
    Lopdf,
    OcrEndpoint,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "bangla-rag boot"
    );

    match &cli.command {
        Command::Extract {
            pdf,
            first_page,
            last_page,
            extractor,
            min_chunk_chars,
        } => {
            let range = PageRange::new(*first_page, *last_page)?;
            let options = NormalizerOptions {
                min_chunk_chars: *min_chunk_chars,
                ..NormalizerOptions::default()
            };
            let kind = *extractor;
            let pdf = pdf.clone();
            let output = cli.chunks.clone();

            // Extractors shell out or use a blocking HTTP client.
            let report = tokio::task::spawn_blocking(move || {
                let extractor = page_extractor(kind)?;
                run_ingestion(&pdf, extractor.as_ref(), range, &options, &output)
                    .with_context(|| format!("ingestion of {} failed", pdf.display()))
            })
            .await??;

            println!(
                "{} chunks from {} pages written to {} (fingerprint {})",
                report.chunks,
                report.pages,
                report.output.display(),
                report.fingerprint
            );
        }
        Command::BuildIndex { batch_size } => {
            ensure_persistent_index(cli.vector_backend)?;
            let store = load_store(&cli.chunks)?;
            let embedder = embedder(&cli)?;
            let index = vector_index(&cli, embedder.dimensions())?;

            let indexed = build_index(&store, &embedder, &index, *batch_size).await?;

            let path = manifest_location(&cli);
            IndexManifest::for_store(&store, &cli.qdrant_collection, embedder.dimensions())
                .write(&path)?;
            info!(manifest = %path.display(), "index manifest written");
            println!("{indexed} chunks indexed at {}", Utc::now().to_rfc3339());
        }
        Command::Ask { query } => {
            let service = load_service(&cli).await?;
            let answer = service.ask(query).await?;

            println!("answer: {}", answer.answer);
            for (rank, context) in answer.contexts.iter().enumerate() {
                println!("[{}] {context}", rank + 1);
            }
        }
        Command::Evaluate { file, output } => {
            let items = read_eval_items(file)?;
            let service = load_service(&cli).await?;
            let report = evaluate(&service, &items).await?;
            let rendered = serde_json::to_string_pretty(&report)?;

            match output {
                Some(path) => {
                    std::fs::write(path, rendered)
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    println!(
                        "accuracy {:.2} over {} items, report at {}",
                        report.accuracy,
                        report.results.len(),
                        path.display()
                    );
                }
                None => println!("{rendered}"),
            }
        }
        Command::Serve { addr } => {
            let service = Arc::new(load_service(&cli).await?);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!(%addr, "serving");

            axum::serve(listener, server::router(service))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

fn page_extractor(kind: ExtractorKind) -> anyhow::Result<Box<dyn PageExtractor>> {
    let extractor: Box<dyn PageExtractor> = match kind {
        ExtractorKind::Tesseract => Box::new(TesseractExtractor::default()),
        ExtractorKind::Lopdf => Box::new(LopdfExtractor),
        ExtractorKind::OcrEndpoint => {
            let Some(config) = OcrEndpointConfig::from_env() else {
                bail!("LLM_OCR_ENDPOINT must be set for the ocr-endpoint extractor");
            };
            Box::new(OcrEndpointExtractor::new(config))
        }
    };
    Ok(extractor)
}

/// The in-memory index dies with the process, so building it offline is pointless.
fn ensure_persistent_index(backend: VectorBackend) -> anyhow::Result<()> {
    if let VectorBackend::Memory = backend {
        bail!(
            "build-index needs a persistent backend (--vector-backend qdrant); \
             the in-memory index is rebuilt automatically by ask, evaluate and serve"
        );
    }
    Ok(())
}

fn load_store(path: &Path) -> anyhow::Result<ChunkStore> {
    let store = ChunkStore::load(path)
        .with_context(|| format!("loading chunk store {}", path.display()))?;
    if store.is_empty() {
        bail!("chunk store {} has no chunks; run `extract` first", path.display());
    }
    Ok(store)
}

fn manifest_location(cli: &Cli) -> PathBuf {
    cli.manifest
        .clone()
        .unwrap_or_else(|| manifest_path(&cli.chunks))
}

fn embedder(cli: &Cli) -> anyhow::Result<Box<dyn Embedder>> {
    let timeout = Duration::from_secs(cli.embed_timeout_secs);
    let embedder: Box<dyn Embedder> = match cli.embedder {
        EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder {
            dimensions: cli.embed_dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        }),
        EmbedderKind::Ollama => Box::new(OllamaEmbedder::new(
            &cli.ollama_url,
            cli.embed_model.clone(),
            cli.embed_dimensions.unwrap_or(DEFAULT_OLLAMA_EMBED_DIMENSIONS),
            timeout,
        )?),
    };
    Ok(embedder)
}

fn vector_index(cli: &Cli, dimensions: usize) -> anyhow::Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match cli.vector_backend {
        VectorBackend::Memory => Box::new(InMemoryVectorIndex::new()),
        VectorBackend::Qdrant => Box::new(QdrantStore::new(
            cli.qdrant_url.clone(),
            cli.qdrant_collection.clone(),
            dimensions,
            Duration::from_secs(cli.index_timeout_secs),
        )?),
    };
    Ok(index)
}

/// Builds the read-only query context once per process.
async fn load_service(cli: &Cli) -> anyhow::Result<Service> {
    let store = load_store(&cli.chunks)?;
    let embedder = embedder(cli)?;
    let index = vector_index(cli, embedder.dimensions())?;

    match cli.vector_backend {
        VectorBackend::Memory => {
            build_index(&store, &embedder, &index, DEFAULT_EMBED_BATCH).await?;
        }
        VectorBackend::Qdrant => {
            verify_manifest(&store, &manifest_location(cli));
        }
    }

    let generator: Box<dyn Generator> = Box::new(OllamaGenerator::new(
        &cli.ollama_url,
        cli.llm_model.clone(),
        Duration::from_secs(cli.generation_timeout_secs),
    )?);
    let options = RetrievalOptions {
        top_k: cli.top_k,
        embed_timeout: Duration::from_secs(cli.embed_timeout_secs),
        index_timeout: Duration::from_secs(cli.index_timeout_secs),
    };
    info!(chunks = store.len(), top_k = cli.top_k, "query context ready");

    let retriever = HybridRetriever::new(
        Arc::new(store),
        LexicalScorer::new()?,
        embedder,
        index,
        options,
    );
    Ok(RagService::new(retriever, generator))
}

/// Accepts either a bare array of items or the `/evaluate` request body.
fn read_eval_items(path: &Path) -> anyhow::Result<Vec<EvalItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading evaluation file {}", path.display()))?;
    if let Ok(request) = serde_json::from_str::<EvaluateRequest>(&raw) {
        return Ok(request.items);
    }
    serde_json::from_str::<Vec<EvalItem>>(&raw)
        .with_context(|| format!("parsing evaluation file {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_build_rejects_the_in_memory_backend() {
        let error = ensure_persistent_index(VectorBackend::Memory)
            .expect_err("memory backend cannot be built offline");
        assert!(error.to_string().contains("qdrant"));
        assert!(ensure_persistent_index(VectorBackend::Qdrant).is_ok());
    }

    #[test]
    fn build_index_with_memory_backend_fails_before_loading_chunks() {
        let cli = Cli::parse_from([
            "bangla-rag",
            "--chunks",
            "/nonexistent/chunks.txt",
            "--vector-backend",
            "memory",
            "build-index",
        ]);
        assert!(matches!(cli.command, Command::BuildIndex { batch_size: 32 }));
        assert!(ensure_persistent_index(cli.vector_backend).is_err());
    }
}
