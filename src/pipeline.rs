//! The ingestion pipeline: format dispatch, caching, normalization,
//! chunking, and metadata annotation wired together.

use std::path::Path;

use tracing::{error, info};
use uuid::Uuid;

use crate::chunking::MarkdownSplitter;
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::ingestion::cache::{CacheKind, ChecksumCache};
use crate::ingestion::extract::{detect_format, extract, SourceFormat};
use crate::metadata::MetadataAnnotator;
use crate::normalize::HeaderNormalizer;
use crate::tokenizer;
use crate::types::{
    Chunk, DocumentChunks, DocumentInput, IngestFailure, IngestOutcome, RagError,
};

/// Converts documents into chunked, metadata-annotated datasets.
///
/// Construct once and reuse: the tokenizer vocabulary is loaded at
/// construction and every call shares the same cache.
///
/// ```rust,no_run
/// use ragmill::{PipelineConfig, RagPipeline};
///
/// # async fn example() {
/// let pipeline = RagPipeline::new(
///     PipelineConfig::builder().cache_dir(".rag-cache").build(),
/// );
/// let outcome = pipeline.process(&["manual.pdf".into()]).await;
/// for document in &outcome.documents {
///     println!("{}: {} chunks", document.input.path.display(), document.chunks.len());
/// }
/// # }
/// ```
pub struct RagPipeline {
    config: PipelineConfig,
    cache: ChecksumCache,
    normalizer: HeaderNormalizer,
    splitter: MarkdownSplitter,
    annotator: MetadataAnnotator,
}

impl RagPipeline {
    /// Builds a pipeline from the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        let counter = tokenizer::default_counter();
        let cache = ChecksumCache::new(config.cache_dir.clone());
        let normalizer = HeaderNormalizer::new(config.max_heading_level, config.llm.clone());
        let splitter = MarkdownSplitter::new(
            config.chunk_size,
            config.chunk_overlap,
            config.preserve_tables,
            counter.clone(),
        );
        let annotator = MetadataAnnotator::new(config.clone(), counter);
        Self {
            config,
            cache,
            normalizer,
            splitter,
            annotator,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes a batch of inputs. Per-input failures are collected in the
    /// outcome rather than aborting the batch.
    pub async fn process(&self, inputs: &[DocumentInput]) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        for input in inputs {
            match self.process_input(input).await {
                Ok(document) => {
                    info!(
                        path = %input.path.display(),
                        chunks = document.chunks.len(),
                        from_cache = document.from_cache,
                        "document processed"
                    );
                    outcome.documents.push(document);
                }
                Err(err) => {
                    error!(path = %input.path.display(), error = %err, "document skipped");
                    outcome.failures.push(IngestFailure {
                        path: input.path.clone(),
                        error: err,
                    });
                }
            }
        }
        outcome
    }

    /// Processes a single path with no custom metadata.
    pub async fn process_path(&self, path: impl AsRef<Path>) -> Result<DocumentChunks, RagError> {
        self.process_input(&DocumentInput::new(path.as_ref())).await
    }

    /// Processes a batch and flattens the result into a dataset with a
    /// `domain` index per source document. Failures are logged and skipped.
    pub async fn generate_dataset(&self, inputs: &[DocumentInput]) -> Dataset {
        let outcome = self.process(inputs).await;
        Dataset::from_documents(outcome.documents)
    }

    async fn process_input(&self, input: &DocumentInput) -> Result<DocumentChunks, RagError> {
        let path = &input.path;
        if !path.exists() {
            return Err(RagError::FileNotFound(path.clone()));
        }
        let format = detect_format(path)?;
        let markdown = self.markdown_for(path, format).await?;

        // Key the chunk tier on everything that shapes chunk output: the
        // extracted text, the custom metadata, and the chunking options.
        let custom_json = serde_json::to_string(&input.metadata)
            .map_err(|err| RagError::Cache(err.to_string()))?;
        let key_material = format!(
            "{markdown}\n--custom:{custom_json}\n--options:{}",
            self.config.chunk_options_fingerprint()
        );
        let chunk_digest = self.cache.text_digest(&key_material);

        if let Some(mut chunks) = self.cache.load_chunks(&chunk_digest).await? {
            // The same content may resurface under a different path, and ids
            // must stay unique across documents even then.
            for chunk in &mut chunks {
                chunk.id = Uuid::new_v4();
                chunk.source = path.clone();
            }
            return Ok(DocumentChunks {
                input: input.clone(),
                chunks,
                from_cache: true,
            });
        }

        let normalized = self.normalized_markdown(&markdown).await?;
        let mut chunks: Vec<Chunk> = self
            .splitter
            .split(&normalized)
            .into_iter()
            .enumerate()
            .map(|(index, split)| Chunk {
                id: Uuid::new_v4(),
                source: path.clone(),
                chunk_index: index,
                text: split.text,
                token_count: split.token_count,
                metadata: split.metadata,
            })
            .collect();

        self.annotator.add_custom(&mut chunks, &input.metadata);
        if self.config.embed_metadata {
            self.annotator.embed(&mut chunks);
        }

        self.cache.store_chunks(&chunk_digest, &chunks).await?;
        Ok(DocumentChunks {
            input: input.clone(),
            chunks,
            from_cache: false,
        })
    }

    /// Returns the Markdown rendition of `path`, consulting the `Convert`
    /// cache tier for non-Markdown formats.
    async fn markdown_for(&self, path: &Path, format: SourceFormat) -> Result<String, RagError> {
        if format == SourceFormat::Markdown {
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        let digest = self.cache.file_digest(path).await?;
        if let Some(text) = self.cache.load_markdown(CacheKind::Convert, &digest).await? {
            return Ok(text);
        }

        info!(path = %path.display(), format = format.name(), "extracting document");
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract(format, &owned))
            .await
            .map_err(|err| RagError::Extraction {
                path: path.to_path_buf(),
                message: err.to_string(),
            })??;

        self.cache
            .store_markdown(CacheKind::Convert, &digest, &text)
            .await?;
        Ok(text)
    }

    /// Returns header-normalized Markdown, consulting the `Normalize` tier.
    ///
    /// The tier key covers the normalization settings as well as the text,
    /// so a changed clamp level or LLM endpoint never replays a stale
    /// rewrite.
    async fn normalized_markdown(&self, markdown: &str) -> Result<String, RagError> {
        let key_material = format!(
            "{markdown}\n--normalize:{}",
            self.config.normalize_options_fingerprint()
        );
        let digest = self.cache.text_digest(&key_material);
        if let Some(text) = self
            .cache
            .load_markdown(CacheKind::Normalize, &digest)
            .await?
        {
            return Ok(text);
        }
        let normalized = self.normalizer.normalize(markdown).await;
        self.cache
            .store_markdown(CacheKind::Normalize, &digest, &normalized)
            .await?;
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_reported_not_panicked() {
        let pipeline = RagPipeline::new(PipelineConfig::default());
        let err = pipeline.process_path("does/not/exist.md").await.unwrap_err();
        assert!(matches!(err, RagError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn unsupported_extension_lands_in_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "plain text").await.unwrap();

        let pipeline = RagPipeline::new(PipelineConfig::default());
        let outcome = pipeline.process(&[DocumentInput::new(&path)]).await;
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0].error,
            RagError::UnsupportedFormat { .. }
        ));
    }
}
