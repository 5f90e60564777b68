use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MIN_CHUNK_CHARS: usize = 30;
pub const DEFAULT_TOP_K: usize = 5;

/// Case-insensitive line patterns for the promotional banners that OCR picks
/// up from the scanned edition.
pub const DEFAULT_WATERMARK_PATTERNS: [&str; 6] = [
    r"HSC ?26",
    r"অনলাইন ব্যাচ",
    r"10 ?MINUTE ?SCHOOL",
    r"মিনিট স্কুল",
    r"Minute School",
    r"কল ?আল্লাইন ব্যাচ",
];

/// Inclusive, 1-based range of source pages that hold the story text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Result<Self, IngestError> {
        if start == 0 || end < start {
            return Err(IngestError::InvalidPageRange(format!("{start}..={end}")));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl Default for PageRange {
    fn default() -> Self {
        Self { start: 6, end: 17 }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerOptions {
    pub min_chunk_chars: usize,
    pub watermark_patterns: Vec<String>,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
            watermark_patterns: DEFAULT_WATERMARK_PATTERNS
                .iter()
                .map(|pattern| (*pattern).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            embed_timeout: Duration::from_secs(30),
            index_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Vector,
}

/// A chunk paired with its lexical score and its position in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredChunk<'a> {
    pub score: u8,
    pub position: usize,
    pub text: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub mode: SearchMode,
    pub lexical_score: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Retrieval {
    pub query: String,
    pub keywords: Vec<String>,
    pub hits: Vec<RetrievedChunk>,
}

impl Retrieval {
    pub fn texts(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub(crate) fn contains_text(&self, text: &str) -> bool {
        self.hits.iter().any(|hit| hit.text == text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvalItem {
    pub query: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalRecord {
    pub query: String,
    pub expected: String,
    pub answer: String,
    pub correct: bool,
    pub grounded: bool,
    pub relevance: Relevance,
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    pub accuracy: f64,
    pub results: Vec<EvalRecord>,
}
