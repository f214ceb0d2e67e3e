//! Merging custom metadata into chunks and rendering metadata into text.

use std::sync::Arc;

use serde_json::Value;

use crate::config::{MetadataPlacement, PipelineConfig};
use crate::tokenizer::TokenCounter;
use crate::types::{Chunk, Metadata};

/// Default embed template: metadata lines, a blank line, then the text.
const DEFAULT_TEMPLATE: &str = "{metadata}\n\n{text}";

/// Applies custom metadata and optional text embedding to chunk lists.
pub struct MetadataAnnotator {
    config: PipelineConfig,
    counter: Arc<dyn TokenCounter>,
}

impl MetadataAnnotator {
    /// Creates an annotator for the given pipeline settings.
    pub fn new(config: PipelineConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self { config, counter }
    }

    /// Merges `custom` into each chunk's metadata map.
    ///
    /// With [`MetadataPlacement::Before`] the structural fields win key
    /// collisions; with [`MetadataPlacement::After`] the custom fields do.
    pub fn add_custom(&self, chunks: &mut [Chunk], custom: &Metadata) {
        if custom.is_empty() {
            return;
        }
        for chunk in chunks.iter_mut() {
            chunk.metadata = match self.config.metadata_placement {
                MetadataPlacement::Before => {
                    let mut merged = custom.clone();
                    for (key, value) in &chunk.metadata {
                        merged.insert(key.clone(), value.clone());
                    }
                    merged
                }
                MetadataPlacement::After => {
                    let mut merged = chunk.metadata.clone();
                    for (key, value) in custom {
                        merged.insert(key.clone(), value.clone());
                    }
                    merged
                }
            };
        }
    }

    /// Renders each chunk's metadata into its text and recomputes the
    /// token count. Chunks without metadata are left alone.
    pub fn embed(&self, chunks: &mut [Chunk]) {
        let template = self
            .config
            .embed_template
            .as_deref()
            .unwrap_or(DEFAULT_TEMPLATE);

        for chunk in chunks.iter_mut() {
            if chunk.metadata.is_empty() {
                continue;
            }
            let rendered = template
                .replace("{metadata}", &self.render_metadata(&chunk.metadata))
                .replace("{text}", &chunk.text);
            chunk.text = rendered.trim().to_string();
            chunk.token_count = self.counter.count(&chunk.text);
        }
    }

    fn render_metadata(&self, metadata: &Metadata) -> String {
        metadata
            .iter()
            .map(|(key, value)| {
                let display = self.config.display_name(key);
                match value {
                    Value::String(text) => format!("{display}: {text}"),
                    other => format!("{display}: {other}"),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
