//! # ragmill
//!
//! Checksum-cached multi-format document ingestion for retrieval-augmented
//! generation. Heterogeneous inputs (Markdown, PDF, HTML, Word) are
//! converted into chunked, metadata-annotated datasets; content checksums
//! keep reruns from repeating any work that already happened.
//!
//! # Pipeline
//!
//! ```text
//! DocumentInput ──► ingestion::extract (format dispatch)  ──► Markdown
//!                        │  cached per file digest (convert tier)
//!                        ▼
//!                normalize::HeaderNormalizer (clamp / LLM)
//!                        │  cached per text+settings digest (normalize tier)
//!                        ▼
//!                chunking::MarkdownSplitter (headings, tables, tokens)
//!                        │
//!                        ▼
//!                metadata::MetadataAnnotator (merge + embed)
//!                        │  cached per text+options digest (chunks tier)
//!                        ▼
//!                Vec<Chunk> ──► Dataset (domain-indexed rows, JSONL)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ragmill::{DocumentInput, PipelineConfig, RagPipeline};
//!
//! # async fn example() -> Result<(), ragmill::RagError> {
//! let pipeline = RagPipeline::new(
//!     PipelineConfig::builder()
//!         .cache_dir(".rag-cache")
//!         .chunk_size(256)
//!         .chunk_overlap(30)
//!         .build(),
//! );
//!
//! let dataset = pipeline
//!     .generate_dataset(&[
//!         DocumentInput::new("manual.pdf"),
//!         DocumentInput::new("notes.md"),
//!     ])
//!     .await;
//! dataset.write_jsonl(std::path::Path::new("corpus.jsonl")).await?;
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod dataset;
pub mod ingestion;
pub mod metadata;
pub mod normalize;
pub mod pipeline;
pub mod tokenizer;
pub mod types;

pub use config::{LlmConfig, MetadataPlacement, PipelineConfig, PipelineConfigBuilder};
pub use dataset::{Dataset, DatasetRecord};
pub use ingestion::{CacheKind, ChecksumCache, SourceFormat};
pub use pipeline::RagPipeline;
pub use types::{
    Chunk, DocumentChunks, DocumentInput, IngestFailure, IngestOutcome, Metadata, RagError,
};
