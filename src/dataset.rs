//! Flattened dataset assembly for downstream embedding pipelines.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::types::{Chunk, DocumentChunks, Metadata, RagError};

/// One row of a flattened RAG dataset.
///
/// `domain` is the index of the source document within the processed batch,
/// so rows from the same document can be grouped after flattening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Chunk identifier.
    pub id: Uuid,
    /// Index of the source document within the batch.
    pub domain: usize,
    /// Source document path.
    pub source: PathBuf,
    /// Chunk position within its document.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Token count of `text`.
    pub token_count: usize,
    /// Merged metadata.
    pub metadata: Metadata,
}

impl DatasetRecord {
    fn from_chunk(domain: usize, chunk: Chunk) -> Self {
        Self {
            id: chunk.id,
            domain,
            source: chunk.source,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            token_count: chunk.token_count,
            metadata: chunk.metadata,
        }
    }
}

/// A flattened, serializable chunk dataset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<DatasetRecord>,
}

impl Dataset {
    /// Flattens per-document chunk lists, tagging rows with their document
    /// index.
    pub fn from_documents(documents: Vec<DocumentChunks>) -> Self {
        let records = documents
            .into_iter()
            .enumerate()
            .flat_map(|(domain, document)| {
                document
                    .chunks
                    .into_iter()
                    .map(move |chunk| DatasetRecord::from_chunk(domain, chunk))
            })
            .collect();
        Self { records }
    }

    /// Read-only access to the rows.
    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when the dataset holds no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes the dataset as a JSON array.
    pub fn to_json(&self) -> Result<String, RagError> {
        serde_json::to_string_pretty(&self.records).map_err(|err| RagError::Cache(err.to_string()))
    }

    /// Writes the dataset as JSON Lines, one record per line.
    pub async fn write_jsonl(&self, path: &Path) -> Result<(), RagError> {
        let mut out = String::new();
        for record in &self.records {
            let line =
                serde_json::to_string(record).map_err(|err| RagError::Cache(err.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, out).await?;
        Ok(())
    }
}
