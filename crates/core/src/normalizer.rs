use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::NormalizerOptions;
use regex::{Regex, RegexSet, RegexSetBuilder};
use tracing::debug;

/// Drops OCR'd promotional lines (publisher banners, batch adverts) from a
/// chunk while keeping every other line intact.
#[derive(Debug, Clone)]
pub struct WatermarkFilter {
    patterns: RegexSet,
}

impl WatermarkFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;
        Ok(Self { patterns })
    }

    pub fn is_watermark(&self, line: &str) -> bool {
        self.patterns.is_match(line)
    }

    pub fn strip(&self, chunk: &str) -> String {
        chunk
            .split('\n')
            .filter(|line| !self.is_watermark(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct Normalizer {
    min_chunk_chars: usize,
    trailing_space: Regex,
    blank_lines: Regex,
    watermarks: WatermarkFilter,
}

impl Normalizer {
    pub fn new(options: &NormalizerOptions) -> Result<Self, IngestError> {
        Ok(Self {
            min_chunk_chars: options.min_chunk_chars,
            trailing_space: Regex::new(r"[ \t]+\n")?,
            blank_lines: Regex::new(r"\n{3,}")?,
            watermarks: WatermarkFilter::new(&options.watermark_patterns)?,
        })
    }

    pub fn clean_page(&self, raw: &str) -> String {
        let cleaned = self.trailing_space.replace_all(raw, "\n");
        let cleaned = self.blank_lines.replace_all(cleaned.trim(), "\n\n");
        cleaned.into_owned()
    }

    pub fn split_paragraphs<'a>(&'a self, page: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        page.split("\n\n")
            .map(str::trim)
            .filter(move |paragraph| self.is_long_enough(paragraph))
    }

    /// Runs the whole cleanup over the selected pages, in page order, and
    /// returns the chunks ready to be written to the store.
    pub fn normalize_pages(&self, pages: &[PageText]) -> Vec<String> {
        let candidates = pages
            .iter()
            .flat_map(|page| {
                let cleaned = self.clean_page(&page.text);
                self.split_paragraphs(&cleaned)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let candidate_count = candidates.len();

        let chunks = candidates
            .into_iter()
            .filter_map(|candidate| {
                let stripped = self.watermarks.strip(&candidate);
                if self.is_long_enough(stripped.trim()) {
                    Some(flatten_lines(&stripped))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(
            pages = pages.len(),
            candidates = candidate_count,
            chunks = chunks.len(),
            "normalized page text"
        );
        chunks
    }

    fn is_long_enough(&self, text: &str) -> bool {
        text.chars().count() > self.min_chunk_chars
    }
}

pub fn flatten_lines(chunk: &str) -> String {
    chunk.replace('\n', " ").trim().to_string()
}
