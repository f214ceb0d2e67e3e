//! Ingestion utilities for turning source documents into chunked datasets.
//!
//! The helpers in this module provide two core capabilities:
//!
//! * [`cache`] — checksum-keyed caching of extraction, normalization, and
//!   chunk output so unchanged inputs are never reprocessed.
//! * [`extract`] — format detection and structure-preserving extraction to
//!   Markdown for every supported input type.

pub mod cache;
pub mod extract;

pub use cache::{CacheKind, ChecksumCache};
pub use extract::{detect_format, extract, html_to_markdown, SourceFormat};
