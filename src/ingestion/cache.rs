//! Checksum-keyed cache for intermediate and final pipeline artifacts.
//!
//! Three tiers, each in its own subdirectory under the cache root:
//!
//! * [`CacheKind::Convert`] — raw Markdown produced by a format extractor,
//!   keyed by a digest of the source file bytes.
//! * [`CacheKind::Normalize`] — header-normalized Markdown, keyed by a
//!   digest of the pre-normalization text.
//! * [`CacheKind::Chunks`] — final chunk lists, keyed by a digest of the
//!   text plus every option that influences chunk output.
//!
//! A cache built with no root directory is inert: loads return `None` and
//! stores are no-ops, so the pipeline never branches on "caching enabled".

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

use crate::types::{Chunk, RagError};

/// Which tier of the cache an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    /// Raw extractor output (Markdown).
    Convert,
    /// Header-normalized Markdown.
    Normalize,
    /// Final chunk lists (JSON).
    Chunks,
}

impl CacheKind {
    fn dir_name(self) -> &'static str {
        match self {
            CacheKind::Convert => "convert",
            CacheKind::Normalize => "normalize",
            CacheKind::Chunks => "chunks",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            CacheKind::Convert | CacheKind::Normalize => "md",
            CacheKind::Chunks => "json",
        }
    }
}

/// Filesystem cache keyed by SHA-256 content digests.
#[derive(Clone, Debug, Default)]
pub struct ChecksumCache {
    root: Option<PathBuf>,
}

impl ChecksumCache {
    /// Creates a cache rooted at `root`, or a disabled cache for `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Creates a cache that never stores anything.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Returns `true` when the cache persists entries.
    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Cache root directory, if enabled.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Hex SHA-256 digest of a file's bytes.
    pub async fn file_digest(&self, path: &Path) -> Result<String, RagError> {
        let bytes = fs::read(path).await?;
        Ok(digest_bytes(&bytes))
    }

    /// Hex SHA-256 digest of a text payload.
    pub fn text_digest(&self, text: &str) -> String {
        digest_bytes(text.as_bytes())
    }

    fn entry_path(&self, kind: CacheKind, digest: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        Some(
            root.join(kind.dir_name())
                .join(format!("{digest}.{}", kind.extension())),
        )
    }

    /// Loads a Markdown payload from the `Convert` or `Normalize` tier.
    pub async fn load_markdown(
        &self,
        kind: CacheKind,
        digest: &str,
    ) -> Result<Option<String>, RagError> {
        debug_assert!(kind != CacheKind::Chunks);
        let Some(path) = self.entry_path(kind, digest) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).await?;
        tracing::debug!(tier = kind.dir_name(), %digest, "cache hit");
        Ok(Some(text))
    }

    /// Stores a Markdown payload in the `Convert` or `Normalize` tier.
    pub async fn store_markdown(
        &self,
        kind: CacheKind,
        digest: &str,
        text: &str,
    ) -> Result<(), RagError> {
        debug_assert!(kind != CacheKind::Chunks);
        let Some(path) = self.entry_path(kind, digest) else {
            return Ok(());
        };
        write_entry(&path, text.as_bytes()).await
    }

    /// Loads a chunk list from the `Chunks` tier.
    pub async fn load_chunks(&self, digest: &str) -> Result<Option<Vec<Chunk>>, RagError> {
        let Some(path) = self.entry_path(CacheKind::Chunks, digest) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).await?;
        let chunks = serde_json::from_str(&data).map_err(|err| RagError::Cache(err.to_string()))?;
        tracing::debug!(tier = "chunks", %digest, "cache hit");
        Ok(Some(chunks))
    }

    /// Stores a chunk list in the `Chunks` tier.
    pub async fn store_chunks(&self, digest: &str, chunks: &[Chunk]) -> Result<(), RagError> {
        let Some(path) = self.entry_path(CacheKind::Chunks, digest) else {
            return Ok(());
        };
        let data = serde_json::to_string(chunks).map_err(|err| RagError::Cache(err.to_string()))?;
        write_entry(&path, data.as_bytes()).await
    }
}

async fn write_entry(path: &Path, data: &[u8]) -> Result<(), RagError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
