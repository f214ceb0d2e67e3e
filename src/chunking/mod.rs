//! Structure-aware Markdown chunking.

pub mod splitter;

pub use splitter::{MarkdownSplitter, Split};
