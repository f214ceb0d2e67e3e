//! Core types shared across the ingestion pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata attached to inputs and chunks.
///
/// Keys are field names (structural ones like `section` or caller-supplied
/// ones), values are arbitrary JSON.
pub type Metadata = Map<String, Value>;

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Filesystem failure while reading inputs or touching the cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input path does not exist.
    #[error("file not found '{0}'")]
    FileNotFound(PathBuf),

    /// The input extension maps to no known extractor.
    #[error("unsupported format '{extension}' for file '{path}'")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// A format-specific extractor failed to produce text.
    #[error("extraction failed for '{path}': {message}")]
    Extraction { path: PathBuf, message: String },

    /// Header normalization failed.
    #[error("header normalization failed: {0}")]
    Normalization(String),

    /// Splitting or chunk assembly failed.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// A cache entry could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),

    /// The heading-correction model call failed.
    #[error("LLM request failed: {0}")]
    Llm(String),
}

/// A document queued for ingestion: a path plus optional custom metadata
/// that will be merged into every chunk produced from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Location of the source document.
    pub path: PathBuf,
    /// Caller-supplied metadata propagated to every chunk.
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentInput {
    /// Creates an input with no custom metadata.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: Metadata::new(),
        }
    }

    /// Creates an input carrying custom metadata.
    pub fn with_metadata(path: impl Into<PathBuf>, metadata: Metadata) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }
}

impl From<&str> for DocumentInput {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for DocumentInput {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for DocumentInput {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&std::path::Path> for DocumentInput {
    fn from(path: &std::path::Path) -> Self {
        Self::new(path)
    }
}

/// A bounded span of extracted text ready for embedding/retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier for this chunk.
    pub id: Uuid,
    /// Source document path the chunk was cut from.
    pub source: PathBuf,
    /// Zero-based index of the chunk within its source document.
    pub chunk_index: usize,
    /// Chunk text, with tables restored and metadata optionally embedded.
    pub text: String,
    /// Token count of `text` under the configured tokenizer.
    pub token_count: usize,
    /// Structural metadata (section hierarchy) merged with custom metadata.
    pub metadata: Metadata,
}

impl Chunk {
    /// Returns the heading hierarchy fields joined as `a > b > c`, if any.
    pub fn heading_path(&self) -> Option<String> {
        let parts: Vec<&str> = ["section", "subsection", "paragraph"]
            .iter()
            .filter_map(|key| self.metadata.get(*key).and_then(Value::as_str))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" > "))
        }
    }
}

/// Chunks produced from a single input document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentChunks {
    /// The input the chunks were produced from.
    pub input: DocumentInput,
    /// Ordered chunk list.
    pub chunks: Vec<Chunk>,
    /// Whether the chunk list was served from the cache.
    pub from_cache: bool,
}

/// A per-input failure recorded while processing a batch.
#[derive(Debug)]
pub struct IngestFailure {
    /// Path of the input that failed.
    pub path: PathBuf,
    /// The error that stopped it.
    pub error: RagError,
}

/// Outcome of processing a batch of inputs.
///
/// Failures never abort the batch; they are collected here so callers can
/// inspect what was skipped.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Successfully chunked documents, in input order.
    pub documents: Vec<DocumentChunks>,
    /// Inputs that could not be processed.
    pub failures: Vec<IngestFailure>,
}

impl IngestOutcome {
    /// Total number of chunks across all documents.
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|doc| doc.chunks.len()).sum()
    }

    /// Returns `true` when at least one input failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_input_from_path() {
        let input: DocumentInput = "docs/guide.md".into();
        assert_eq!(input.path, PathBuf::from("docs/guide.md"));
        assert!(input.metadata.is_empty());
    }

    #[test]
    fn heading_path_joins_present_levels() {
        let mut metadata = Metadata::new();
        metadata.insert("section".into(), json!("Intro"));
        metadata.insert("paragraph".into(), json!("Details"));
        let chunk = Chunk {
            id: Uuid::new_v4(),
            source: PathBuf::from("a.md"),
            chunk_index: 0,
            text: String::new(),
            token_count: 0,
            metadata,
        };
        assert_eq!(chunk.heading_path().as_deref(), Some("Intro > Details"));
    }

    #[test]
    fn heading_path_empty_when_no_structure() {
        let chunk = Chunk {
            id: Uuid::new_v4(),
            source: PathBuf::from("a.md"),
            chunk_index: 0,
            text: "body".into(),
            token_count: 1,
            metadata: Metadata::new(),
        };
        assert!(chunk.heading_path().is_none());
    }
}
