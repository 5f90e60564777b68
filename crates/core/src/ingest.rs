use crate::error::IngestError;
use crate::extractor::PageExtractor;
use crate::models::{NormalizerOptions, PageRange};
use crate::normalizer::Normalizer;
use crate::store::ChunkStore;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub fingerprint: String,
}

/// Extracts the selected pages and normalizes them into chunks. Nothing is
/// written; any extraction error aborts.
pub fn ingest_document<X>(
    source: &Path,
    extractor: &X,
    range: PageRange,
    options: &NormalizerOptions,
) -> Result<(usize, ChunkStore), IngestError>
where
    X: PageExtractor + ?Sized,
{
    let normalizer = Normalizer::new(options)?;
    let pages = extractor.extract_pages(source, range)?;
    info!(
        source = %source.display(),
        first_page = range.start,
        last_page = range.end,
        pages = pages.len(),
        "extracted page text"
    );

    let chunks = normalizer.normalize_pages(&pages);
    Ok((pages.len(), ChunkStore::new(chunks)))
}

/// Full offline run: extract, normalize, then replace the chunk store file.
pub fn run_ingestion<X>(
    source: &Path,
    extractor: &X,
    range: PageRange,
    options: &NormalizerOptions,
    output: &Path,
) -> Result<IngestionReport, IngestError>
where
    X: PageExtractor + ?Sized,
{
    let (pages, store) = ingest_document(source, extractor, range, options)?;
    if store.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no chunks survived normalization for {}",
            source.display()
        )));
    }

    store.save(output)?;

    Ok(IngestionReport {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        pages,
        chunks: store.len(),
        fingerprint: store.fingerprint(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use std::fs;
    use tempfile::tempdir;

    struct FixedPages(Vec<PageText>);

    impl PageExtractor for FixedPages {
        fn extract_pages(
            &self,
            _path: &Path,
            range: PageRange,
        ) -> Result<Vec<PageText>, IngestError> {
            Ok(self
                .0
                .iter()
                .filter(|page| range.contains(page.number))
                .cloned()
                .collect())
        }
    }

    struct BrokenOcr;

    impl PageExtractor for BrokenOcr {
        fn extract_pages(
            &self,
            _path: &Path,
            _range: PageRange,
        ) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::OcrFailed("tesseract failed on page 9".to_string()))
        }
    }

    fn pages() -> FixedPages {
        FixedPages(vec![
            PageText {
                number: 5,
                text: "সূচিপত্র পৃষ্ঠার লেখা যা কখনো পড়া উচিত নয়, অনেক লম্বা লাইন".to_string(),
            },
            PageText {
                number: 6,
                text: "আজ আমার বয়স সাতাশ মাত্র। এ জীবনটা না দৈর্ঘ্যের হিসাবে বড়ো \t\n\n\n\nHSC 26 অনলাইন ব্যাচ\n\nমামা তার ভাগ্যদেবতার প্রধান এজেন্ট ছিলেন বলে শোনা যায়".to_string(),
            },
        ])
    }

    #[test]
    fn only_pages_in_range_are_chunked() -> Result<(), IngestError> {
        let range = PageRange::new(6, 17)?;
        let (page_count, store) =
            ingest_document(Path::new("book.pdf"), &pages(), range, &NormalizerOptions::default())?;

        assert_eq!(page_count, 1);
        assert_eq!(store.len(), 2);
        assert!(store.chunks().iter().all(|chunk| !chunk.contains("সূচিপত্র")));
        assert!(store.chunks().iter().all(|chunk| !chunk.contains("HSC")));
        Ok(())
    }

    #[test]
    fn ingestion_writes_a_loadable_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let output = dir.path().join("vector_store").join("chunks.txt");

        let report = run_ingestion(
            Path::new("book.pdf"),
            &pages(),
            PageRange::default(),
            &NormalizerOptions::default(),
            &output,
        )?;

        let loaded = ChunkStore::load(&output)?;
        assert_eq!(report.chunks, loaded.len());
        assert_eq!(report.fingerprint, loaded.fingerprint());
        Ok(())
    }

    #[test]
    fn ocr_failure_leaves_existing_store_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let output = dir.path().join("chunks.txt");
        fs::write(&output, "previous chunk text\n---chunk---\n")?;

        let result = run_ingestion(
            Path::new("book.pdf"),
            &BrokenOcr,
            PageRange::default(),
            &NormalizerOptions::default(),
            &output,
        );

        assert!(matches!(result, Err(IngestError::OcrFailed(_))));
        assert_eq!(fs::read_to_string(&output)?, "previous chunk text\n---chunk---\n");
        Ok(())
    }
}
