//! Keyword and named-entity heuristics used for the first retrieval pass.
//!
//! A chunk scores 1 when it contains any query keyword and 2 when it also
//! mentions something that looks like a named person (a Bangla stem followed by
//! an honorific or a known character name). Everything else scores 0.

use crate::error::IngestError;
use crate::models::ScoredChunk;
use crate::store::ChunkStore;
use regex::Regex;
use std::collections::HashSet;

pub const STOPWORDS: [&str; 33] = [
    "কে", "কাকে", "এর", "এই", "ওই", "তাকে", "বলে", "হয়ে", "হয়েছে", "অনুপমের", "অনুপম", "উল্লেখ",
    "বলা", "কি", "কার", "কোন", "কখন", "কারণ", "প্রকৃত", "বয়স", "কত", "বলেছে", "দিয়ে", "বা", "কেন",
    "এবং", "তা", "তাহার", "তাহাকে", "তুমি", "আমি", "আমার", "আমাদের",
];

pub const TRIM_CHARS: [char; 5] = ['?', ',', '।', '\'', '"'];

const ENTITY_PATTERN: &str = r"[অ-হ][অ-হা-ৌ্\-]+(?:বাবু|মামা|দাদা|শাস্ত্রী|চৌধুরী|সাহেব|নীলমণি|কল্যাণী|শস্তুনাথ|শুম্ভুনাথ)";

const MIN_KEYWORD_CHARS: usize = 2;

#[derive(Debug, Clone)]
pub struct LexicalScorer {
    entity: Regex,
    stopwords: HashSet<String>,
}

impl LexicalScorer {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            entity: Regex::new(ENTITY_PATTERN)?,
            stopwords: STOPWORDS.iter().map(|word| (*word).to_string()).collect(),
        })
    }

    /// Query tokens longer than two characters that survive punctuation
    /// stripping and the stopword list, deduplicated in first-seen order.
    pub fn extract_keywords(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        query
            .split_whitespace()
            .map(|token| token.trim_matches(&TRIM_CHARS[..]))
            .filter(|token| token.chars().count() > MIN_KEYWORD_CHARS)
            .filter(|token| !self.stopwords.contains(*token))
            .filter(|token| seen.insert(*token))
            .map(str::to_string)
            .collect()
    }

    pub fn has_entity_candidates(&self, chunk: &str) -> bool {
        self.entity.is_match(chunk)
    }

    pub fn entity_candidates<'a>(&self, chunk: &'a str) -> HashSet<&'a str> {
        self.entity
            .find_iter(chunk)
            .map(|found| found.as_str())
            .collect()
    }

    pub fn score(&self, chunk: &str, keywords: &[String]) -> u8 {
        if !keywords.iter().any(|keyword| chunk.contains(keyword.as_str())) {
            return 0;
        }
        if self.has_entity_candidates(chunk) {
            2
        } else {
            1
        }
    }

    /// Scores every chunk and orders them best first. Equal scores keep store
    /// order.
    pub fn rank<'a>(&self, store: &'a ChunkStore, keywords: &[String]) -> Vec<ScoredChunk<'a>> {
        let mut scored = store
            .iter()
            .map(|(position, text)| ScoredChunk {
                score: self.score(text, keywords),
                position,
                text,
            })
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| {
            right
                .score
                .cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });
        scored
    }
}
