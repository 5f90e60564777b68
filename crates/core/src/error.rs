use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("chunk {position} contains the store delimiter")]
    DelimiterInChunk { position: usize },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("generation backend returned {status}")]
    Status { status: u16 },

    #[error("generation timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("retrieval failed for item {index}: {source}")]
    Retrieval {
        index: usize,
        #[source]
        source: SearchError,
    },

    #[error("generation failed for item {index}: {source}")]
    Generation {
        index: usize,
        #[source]
        source: GenerationError,
    },
}
