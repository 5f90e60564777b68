use crate::error::IngestError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub const CHUNK_DELIMITER: &str = "---chunk---";

/// The ordered list of chunks shared by lexical scoring and the vector index.
/// A chunk's position is its identity in the index (`chunk_<position>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStore {
    chunks: Vec<String>,
}

impl ChunkStore {
    pub fn new(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    /// Splits on the delimiter and drops blank segments. Malformed input never
    /// fails; it only yields fewer chunks.
    pub fn parse(raw: &str) -> Self {
        let chunks = raw
            .split(CHUNK_DELIMITER)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self { chunks }
    }

    pub fn serialize(&self) -> Result<String, IngestError> {
        let mut out = String::new();
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.contains(CHUNK_DELIMITER) {
                return Err(IngestError::DelimiterInChunk { position });
            }
            out.push_str(chunk);
            out.push('\n');
            out.push_str(CHUNK_DELIMITER);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = fs::read_to_string(path)?;
        let store = Self::parse(&raw);
        if store.is_empty() {
            warn!(path = %path.display(), "chunk store is empty or malformed");
        } else {
            info!(path = %path.display(), chunks = store.len(), "loaded chunk store");
        }
        Ok(store)
    }

    /// Writes through a sibling temp file and renames it into place, so an
    /// existing store is never left half-written.
    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let serialized = self.serialize()?;
        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::InvalidArgument(format!("path has no file name: {}", path.display()))
            })?;
        let staging = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let written = (|| {
            let mut file = fs::File::create(&staging)?;
            file.write_all(serialized.as_bytes())?;
            file.sync_all()?;
            fs::rename(&staging, path)
        })();

        if let Err(error) = written {
            let _ = fs::remove_file(&staging);
            return Err(error.into());
        }

        info!(path = %path.display(), chunks = self.len(), "saved chunk store");
        Ok(())
    }

    /// SHA-256 over the serialized sequence; changes with any edit to content
    /// or order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for chunk in &self.chunks {
            hasher.update(chunk.as_bytes());
            hasher.update(b"\n");
            hasher.update(CHUNK_DELIMITER.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.chunks.iter().map(String::as_str).enumerate()
    }
}

pub fn chunk_id(position: usize) -> String {
    format!("chunk_{position}")
}
