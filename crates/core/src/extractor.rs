use crate::error::IngestError;
use crate::models::PageRange;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Turns the pages of a source document inside `range` into raw text, in page
/// order. Any page that cannot be read fails the whole extraction.
pub trait PageExtractor {
    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<PageText>, IngestError>;
}

/// Reads the embedded text layer. Only useful for PDFs that already carry text.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let page_count = document.get_pages().len() as u32;
        ensure_range_fits(range, page_count, path)?;

        range
            .pages()
            .map(|number| {
                let text = document
                    .extract_text(&[number])
                    .map_err(|error| IngestError::PdfParse(error.to_string()))?;
                Ok::<_, IngestError>(PageText { number, text })
            })
            .collect()
    }
}

/// Rasterizes each page with `pdftoppm` and OCRs the image with `tesseract`.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    pub pdftoppm: PathBuf,
    pub tesseract: PathBuf,
    pub language: String,
    pub dpi: u32,
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
            language: "ben".to_string(),
            dpi: 300,
        }
    }
}

impl TesseractExtractor {
    fn rasterize(&self, pdf: &Path, page: u32, prefix: &Path) -> Result<PathBuf, IngestError> {
        let page_arg = page.to_string();
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.dpi.to_string())
            .args(["-f", &page_arg, "-l", &page_arg, "-png", "-singlefile"])
            .arg(pdf)
            .arg(prefix)
            .output()?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "pdftoppm failed on page {page}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(prefix.with_extension("png"))
    }

    fn recognize(&self, image: &Path, page: u32) -> Result<String, IngestError> {
        let output = Command::new(&self.tesseract)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "tesseract failed on page {page}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PageExtractor for TesseractExtractor {
    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<PageText>, IngestError> {
        if !path.is_file() {
            return Err(IngestError::InvalidArgument(format!(
                "source document not found: {}",
                path.display()
            )));
        }

        let scratch = std::env::temp_dir().join(format!("bangla-rag-ocr-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&scratch)?;

        let pages = range
            .pages()
            .map(|number| {
                info!(page = number, "OCR extracting page");
                let image = self.rasterize(path, number, &scratch.join(format!("page-{number}")))?;
                let text = self.recognize(&image, number)?;
                Ok::<_, IngestError>(PageText { number, text })
            })
            .collect::<Result<Vec<_>, IngestError>>();

        if let Err(error) = fs::remove_dir_all(&scratch) {
            debug!(%error, dir = %scratch.display(), "could not remove OCR scratch dir");
        }
        pages
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    pdf_base64: String,
    source_path: String,
    first_page: u32,
    last_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl OcrEndpointConfig {
    /// `LLM_OCR_ENDPOINT` plus an optional `LLM_OCR_API_KEY` bearer token.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|key| !key.is_empty());

        Some(Self {
            endpoint,
            api_key,
            timeout: Duration::from_secs(600),
        })
    }
}

/// Sends the whole PDF to a remote OCR service and keeps the pages in range.
pub struct OcrEndpointExtractor {
    config: OcrEndpointConfig,
}

impl OcrEndpointExtractor {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self { config }
    }
}

impl PageExtractor for OcrEndpointExtractor {
    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<PageText>, IngestError> {
        let pdf = fs::read(path)?;
        let payload = OcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: path.to_string_lossy().to_string(),
            first_page: range.start,
            last_page: range.end,
        };

        let mut request = Client::builder()
            .timeout(self.config.timeout)
            .build()?
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json()?;
        pages_in_range(payload_to_pages(&payload, path)?, range, path)
    }
}

/// Keeps the pages inside `range` and requires every one of them to be there.
fn pages_in_range(
    pages: Vec<PageText>,
    range: PageRange,
    path: &Path,
) -> Result<Vec<PageText>, IngestError> {
    let mut selected = pages
        .into_iter()
        .filter(|page| range.contains(page.number))
        .collect::<Vec<_>>();
    selected.sort_by_key(|page| page.number);
    selected.dedup_by_key(|page| page.number);

    let missing = range
        .pages()
        .filter(|number| selected.binary_search_by_key(number, |page| page.number).is_err())
        .map(|number| number.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(IngestError::OcrFailed(format!(
            "OCR response for {} is missing pages {}",
            path.display(),
            missing.join(", ")
        )));
    }

    Ok(selected)
}

fn ensure_range_fits(range: PageRange, page_count: u32, path: &Path) -> Result<(), IngestError> {
    if range.end > page_count {
        return Err(IngestError::InvalidPageRange(format!(
            "{}..={} but {} has {page_count} pages",
            range.start,
            range.end,
            path.display()
        )));
    }
    Ok(())
}

fn payload_to_pages(payload: &OcrResponse, path: &Path) -> Result<Vec<PageText>, IngestError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .enumerate()
            .filter_map(|(index, page)| {
                let text = page.text.as_ref()?;
                if text.trim().is_empty() {
                    return None;
                }
                Some(PageText {
                    number: page.page.unwrap_or(index as u32 + 1),
                    text: text.clone(),
                })
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let pages = raw_text
            .split('\u{000c}')
            .enumerate()
            .filter(|(_, chunk)| !chunk.trim().is_empty())
            .map(|(index, chunk)| PageText {
                number: (index + 1) as u32,
                text: chunk.to_string(),
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(IngestError::OcrFailed(format!(
        "OCR response was empty for {}",
        path.display()
    )))
}
