//! Pipeline configuration and builder.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where caller-supplied metadata lands relative to structural metadata when
/// the two collide on a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MetadataPlacement {
    /// Custom metadata is merged first; structural fields win collisions.
    #[default]
    Before,
    /// Custom metadata is merged last and overrides structural fields.
    After,
}

/// Settings for the optional LLM heading-correction pass.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint (no trailing slash).
    pub base_url: String,
    /// Bearer token sent with each request.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Maximum attempts before falling back to level clamping.
    pub max_attempts: usize,
}

impl LlmConfig {
    /// Creates a config targeting `base_url` with the default model.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_attempts: 3,
        }
    }

    /// Sets the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the retry budget.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Configuration for a [`RagPipeline`](crate::pipeline::RagPipeline).
///
/// Build one with [`PipelineConfig::builder`]; the defaults mirror what a
/// retrieval corpus usually wants (256-token chunks, 30-token overlap,
/// headings clamped to three levels, tables kept intact).
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Cache root; `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,
    /// Target chunk size in tokens.
    pub chunk_size: usize,
    /// Tokens carried over between adjacent chunks.
    pub chunk_overlap: usize,
    /// Deepest heading level kept when clamping.
    pub max_heading_level: usize,
    /// Lift pipe tables out before splitting and restore them afterwards.
    pub preserve_tables: bool,
    /// Render metadata into chunk text.
    pub embed_metadata: bool,
    /// Collision precedence for custom metadata.
    pub metadata_placement: MetadataPlacement,
    /// Display-name overrides for metadata fields when embedding
    /// (for example `section` -> `Chapter`).
    pub field_names: BTreeMap<String, String>,
    /// Custom embed template with `{metadata}` and `{text}` placeholders.
    pub embed_template: Option<String>,
    /// Optional LLM heading correction.
    pub llm: Option<LlmConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            chunk_size: 256,
            chunk_overlap: 30,
            max_heading_level: 3,
            preserve_tables: true,
            embed_metadata: true,
            metadata_placement: MetadataPlacement::Before,
            field_names: BTreeMap::new(),
            embed_template: None,
            llm: None,
        }
    }
}

impl PipelineConfig {
    /// Starts a builder with the default settings.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Effective display name for a metadata field when embedding.
    pub(crate) fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        if let Some(name) = self.field_names.get(key) {
            return name;
        }
        match key {
            "section" => "Section",
            "subsection" => "Subsection",
            "paragraph" => "Paragraph",
            other => other,
        }
    }

    /// Stable fingerprint of every knob that changes normalization output.
    ///
    /// Mixed into normalize-tier cache keys so a changed clamp level or LLM
    /// endpoint never replays stale rewrites. The API key stays out of it;
    /// secrets do not belong in key material and do not change the output.
    pub(crate) fn normalize_options_fingerprint(&self) -> String {
        let llm = match &self.llm {
            Some(llm) => format!(
                "llm[url={};model={};attempts={}]",
                llm.base_url, llm.model, llm.max_attempts
            ),
            None => "llm[off]".to_string(),
        };
        format!("max_heading={};{llm}", self.max_heading_level)
    }

    /// Stable fingerprint of every knob that changes chunk output.
    ///
    /// Mixed into chunk-tier cache keys so stale entries are never replayed
    /// after a settings change. Chunk keys are derived from the raw
    /// pre-normalization text, so the normalization knobs are folded in too.
    pub(crate) fn chunk_options_fingerprint(&self) -> String {
        let placement = match self.metadata_placement {
            MetadataPlacement::Before => "before",
            MetadataPlacement::After => "after",
        };
        let fields: Vec<String> = self
            .field_names
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!(
            "size={};overlap={};tables={};embed={};placement={};fields=[{}];template={};normalize=[{}]",
            self.chunk_size,
            self.chunk_overlap,
            self.preserve_tables,
            self.embed_metadata,
            placement,
            fields.join(","),
            self.embed_template.as_deref().unwrap_or(""),
            self.normalize_options_fingerprint()
        )
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Clone, Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Enables caching under the given directory.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Sets the target chunk size in tokens.
    pub fn chunk_size(mut self, tokens: usize) -> Self {
        self.config.chunk_size = tokens.max(1);
        self
    }

    /// Sets the overlap carried between adjacent chunks.
    pub fn chunk_overlap(mut self, tokens: usize) -> Self {
        self.config.chunk_overlap = tokens;
        self
    }

    /// Sets the deepest heading level kept when clamping.
    pub fn max_heading_level(mut self, level: usize) -> Self {
        self.config.max_heading_level = level.clamp(1, 6);
        self
    }

    /// Toggles pipe-table preservation.
    pub fn preserve_tables(mut self, preserve: bool) -> Self {
        self.config.preserve_tables = preserve;
        self
    }

    /// Toggles rendering metadata into chunk text.
    pub fn embed_metadata(mut self, embed: bool) -> Self {
        self.config.embed_metadata = embed;
        self
    }

    /// Sets collision precedence for custom metadata.
    pub fn metadata_placement(mut self, placement: MetadataPlacement) -> Self {
        self.config.metadata_placement = placement;
        self
    }

    /// Overrides the display name used for a metadata field when embedding.
    pub fn field_name(mut self, key: impl Into<String>, display: impl Into<String>) -> Self {
        self.config.field_names.insert(key.into(), display.into());
        self
    }

    /// Sets a custom embed template (`{metadata}` / `{text}` placeholders).
    pub fn embed_template(mut self, template: impl Into<String>) -> Self {
        self.config.embed_template = Some(template.into());
        self
    }

    /// Enables LLM heading correction.
    pub fn llm(mut self, llm: LlmConfig) -> Self {
        self.config.llm = Some(llm);
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = PipelineConfig::builder()
            .cache_dir("/tmp/rag-cache")
            .chunk_size(512)
            .chunk_overlap(64)
            .max_heading_level(2)
            .preserve_tables(false)
            .metadata_placement(MetadataPlacement::After)
            .field_name("section", "Chapter")
            .build();

        assert_eq!(config.cache_dir.as_deref().unwrap().to_str(), Some("/tmp/rag-cache"));
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 64);
        assert_eq!(config.max_heading_level, 2);
        assert!(!config.preserve_tables);
        assert_eq!(config.metadata_placement, MetadataPlacement::After);
        assert_eq!(config.display_name("section"), "Chapter");
        assert_eq!(config.display_name("subsection"), "Subsection");
        assert_eq!(config.display_name("speaker"), "speaker");
    }

    #[test]
    fn fingerprint_changes_with_chunk_settings() {
        let base = PipelineConfig::default();
        let changed = PipelineConfig::builder().chunk_size(128).build();
        assert_ne!(
            base.chunk_options_fingerprint(),
            changed.chunk_options_fingerprint()
        );
    }

    #[test]
    fn fingerprints_change_with_normalization_settings() {
        let base = PipelineConfig::default();

        let deeper = PipelineConfig::builder().max_heading_level(2).build();
        assert_ne!(
            base.normalize_options_fingerprint(),
            deeper.normalize_options_fingerprint()
        );
        assert_ne!(
            base.chunk_options_fingerprint(),
            deeper.chunk_options_fingerprint()
        );

        let with_llm = PipelineConfig::builder()
            .llm(LlmConfig::new("http://localhost:8080"))
            .build();
        assert_ne!(
            base.normalize_options_fingerprint(),
            with_llm.normalize_options_fingerprint()
        );
        assert_ne!(
            base.chunk_options_fingerprint(),
            with_llm.chunk_options_fingerprint()
        );
    }

    #[test]
    fn api_key_stays_out_of_fingerprints() {
        let anonymous = PipelineConfig::builder()
            .llm(LlmConfig::new("http://localhost:8080"))
            .build();
        let keyed = PipelineConfig::builder()
            .llm(LlmConfig::new("http://localhost:8080").with_api_key("secret"))
            .build();
        assert_eq!(
            anonymous.normalize_options_fingerprint(),
            keyed.normalize_options_fingerprint()
        );
    }

    #[test]
    fn heading_level_is_clamped_to_markdown_range() {
        let config = PipelineConfig::builder().max_heading_level(12).build();
        assert_eq!(config.max_heading_level, 6);
    }
}
