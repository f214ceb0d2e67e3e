//! Markdown splitter: heading-aware sectioning followed by token-bounded
//! recursive splitting, with pipe tables lifted out so they are never cut
//! in half.
//!
//! Headings at levels 1-3 become `section`/`subsection`/`paragraph`
//! metadata and are stripped from chunk text; deeper headings stay in the
//! body. Chunk sizes are measured in tokens via [`TokenCounter`].

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::tokenizer::TokenCounter;
use crate::types::Metadata;

/// Heading keys assigned per level, shallowest first.
const HEADING_KEYS: [&str; 3] = ["section", "subsection", "paragraph"];

/// One run of consecutive pipe-table lines.
fn table_pattern() -> Regex {
    // Any maximal run of lines that start and end with a pipe.
    Regex::new(r"(?m)(?:^\|.*\|[ \t]*\n?)+").expect("static table regex")
}

/// A section of text produced by the splitter, carrying the heading
/// hierarchy it was cut from.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    /// Chunk text with tables restored.
    pub text: String,
    /// Heading hierarchy metadata (`section`/`subsection`/`paragraph`).
    pub metadata: Metadata,
    /// Token count of `text`.
    pub token_count: usize,
}

/// Splits Markdown into token-bounded, metadata-annotated chunks.
pub struct MarkdownSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    preserve_tables: bool,
    counter: Arc<dyn TokenCounter>,
    table_pattern: Regex,
}

impl MarkdownSplitter {
    /// Creates a splitter; `chunk_size`/`chunk_overlap` are in tokens.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        preserve_tables: bool,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size / 2),
            preserve_tables,
            counter,
            table_pattern: table_pattern(),
        }
    }

    /// Splits a Markdown document into chunks.
    pub fn split(&self, text: &str) -> Vec<Split> {
        let (working, tables) = if self.preserve_tables {
            self.extract_tables(text)
        } else {
            (text.to_string(), Vec::new())
        };

        let mut splits = Vec::new();
        for section in split_by_headings(&working) {
            let body = section.body.trim();
            if body.is_empty() {
                continue;
            }
            for piece in self.split_text(body) {
                let restored = restore_tables(&piece, &tables);
                let trimmed = restored.trim();
                if trimmed.is_empty() {
                    continue;
                }
                splits.push(Split {
                    token_count: self.counter.count(trimmed),
                    text: trimmed.to_string(),
                    metadata: section.metadata.clone(),
                });
            }
        }
        splits
    }

    /// Lifts pipe tables out into `{table_N}` placeholders.
    fn extract_tables(&self, text: &str) -> (String, Vec<String>) {
        let mut tables = Vec::new();
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;

        for found in self.table_pattern.find_iter(text) {
            let table = found.as_str().trim_end();
            // A single pipe line is not worth protecting.
            if !table.contains('\n') {
                continue;
            }
            out.push_str(&text[cursor..found.start()]);
            out.push_str(&format!("{{table_{}}}\n", tables.len()));
            tables.push(table.to_string());
            cursor = found.end();
        }
        out.push_str(&text[cursor..]);
        (out, tables)
    }

    /// Token-bounded recursive split over a separator ladder.
    fn split_text(&self, text: &str) -> Vec<String> {
        if self.counter.count(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        self.split_recursive(text, &["\n\n", "\n", " "])
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some((separator, rest)) = separators.split_first() else {
            return self.split_chars(text);
        };

        let mut pieces: Vec<String> = Vec::new();
        for piece in text.split(separator) {
            if piece.is_empty() {
                continue;
            }
            if self.counter.count(piece) > self.chunk_size {
                pieces.extend(self.split_recursive(piece, rest));
            } else {
                pieces.push(piece.to_string());
            }
        }
        self.merge(pieces, separator)
    }

    /// Hard fallback: fixed-size character windows (a char never encodes to
    /// fewer tokens than one window of `chunk_size` chars would allow).
    fn split_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_size.max(1))
            .map(|window| window.iter().collect())
            .collect()
    }

    /// Greedy merge of pieces up to `chunk_size` tokens, carrying
    /// `chunk_overlap` trailing tokens into the next chunk.
    fn merge(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for piece in pieces {
            let piece_tokens = self.counter.count(&piece);
            if current_tokens + piece_tokens > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(separator));

                let mut kept: Vec<String> = Vec::new();
                let mut kept_tokens = 0usize;
                for previous in current.iter().rev() {
                    let tokens = self.counter.count(previous);
                    if kept_tokens + tokens > self.chunk_overlap {
                        break;
                    }
                    kept.push(previous.clone());
                    kept_tokens += tokens;
                }
                kept.reverse();
                current = kept;
                current_tokens = kept_tokens;
            }
            current_tokens += piece_tokens;
            current.push(piece);
        }

        if !current.is_empty() {
            let tail = current.join(separator);
            if !tail.trim().is_empty() {
                chunks.push(tail);
            }
        }
        chunks
    }
}

struct Section {
    metadata: Metadata,
    body: String,
}

/// Cuts the document at level 1-3 headings, accumulating the hierarchy
/// into metadata and stripping the heading lines themselves.
fn split_by_headings(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut metadata = Metadata::new();
    let mut body = String::new();
    let mut in_fence = false;

    let flush = |metadata: &Metadata, body: &mut String, sections: &mut Vec<Section>| {
        if !body.trim().is_empty() {
            sections.push(Section {
                metadata: metadata.clone(),
                body: std::mem::take(body),
            });
        } else {
            body.clear();
        }
    };

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            body.push_str(line);
            body.push('\n');
            continue;
        }

        let level = if in_fence {
            0
        } else {
            heading_level(line).unwrap_or(0)
        };

        if (1..=HEADING_KEYS.len()).contains(&level) {
            flush(&metadata, &mut body, &mut sections);
            let title = line[level..].trim();
            metadata.insert(
                HEADING_KEYS[level - 1].to_string(),
                Value::String(title.to_string()),
            );
            // A shallower heading invalidates everything deeper.
            for deeper in &HEADING_KEYS[level..] {
                metadata.remove(*deeper);
            }
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(&metadata, &mut body, &mut sections);
    sections
}

fn heading_level(line: &str) -> Option<usize> {
    if !line.starts_with('#') {
        return None;
    }
    let level = line.chars().take_while(|c| *c == '#').count();
    // Require a space after the hashes, as Markdown does.
    line[level..].starts_with(' ').then_some(level)
}

fn restore_tables(text: &str, tables: &[String]) -> String {
    let mut out = text.to_string();
    for (index, table) in tables.iter().enumerate() {
        let tag = format!("{{table_{index}}}");
        if out.contains(&tag) {
            out = out.replace(&tag, &format!("\n{table}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::HeuristicCounter;

    fn splitter(chunk_size: usize, overlap: usize) -> MarkdownSplitter {
        MarkdownSplitter::new(chunk_size, overlap, true, Arc::new(HeuristicCounter))
    }

    fn meta_str<'a>(split: &'a Split, key: &str) -> Option<&'a str> {
        split.metadata.get(key).and_then(Value::as_str)
    }

    #[test]
    fn heading_hierarchy_becomes_metadata() {
        let text = "# Guide\n\nintro text\n\n## Install\n\nsteps here\n\n### Linux\n\napt install\n";
        let splits = splitter(256, 0).split(text);
        assert_eq!(splits.len(), 3);

        assert_eq!(meta_str(&splits[0], "section"), Some("Guide"));
        assert_eq!(meta_str(&splits[0], "subsection"), None);
        assert_eq!(splits[0].text, "intro text");

        assert_eq!(meta_str(&splits[1], "section"), Some("Guide"));
        assert_eq!(meta_str(&splits[1], "subsection"), Some("Install"));

        assert_eq!(meta_str(&splits[2], "paragraph"), Some("Linux"));
        assert_eq!(splits[2].text, "apt install");
    }

    #[test]
    fn shallower_heading_clears_deeper_levels() {
        let text = "# A\n\n## B\n\nb body\n\n# C\n\nc body\n";
        let splits = splitter(256, 0).split(text);
        let last = splits.last().unwrap();
        assert_eq!(meta_str(last, "section"), Some("C"));
        assert_eq!(meta_str(last, "subsection"), None);
    }

    #[test]
    fn preface_has_no_heading_metadata() {
        let text = "preface line\n\n# Start\n\nbody\n";
        let splits = splitter(256, 0).split(text);
        assert!(splits[0].metadata.is_empty());
        assert_eq!(splits[0].text, "preface line");
    }

    #[test]
    fn deep_headings_stay_in_body() {
        let text = "# Top\n\n#### Detail\n\ncontent\n";
        let splits = splitter(256, 0).split(text);
        assert_eq!(splits.len(), 1);
        assert!(splits[0].text.contains("#### Detail"));
    }

    #[test]
    fn heading_lines_are_stripped_from_chunks() {
        let text = "# Title\n\nbody text\n";
        let splits = splitter(256, 0).split(text);
        assert_eq!(splits.len(), 1);
        assert!(!splits[0].text.contains("# Title"));
    }

    #[test]
    fn chunks_respect_token_budget() {
        let paragraphs: Vec<String> = (0..20)
            .map(|i| format!("paragraph number {i} with several words inside it"))
            .collect();
        let text = paragraphs.join("\n\n");
        let splits = splitter(30, 0).split(&text);
        assert!(splits.len() > 1);
        for split in &splits {
            assert!(
                split.token_count <= 30,
                "chunk exceeded budget: {} tokens",
                split.token_count
            );
        }
    }

    #[test]
    fn overlap_repeats_trailing_content() {
        let text = "alpha one two\n\nbeta three four\n\ngamma five six\n\ndelta seven eight";
        let splits = splitter(8, 4).split(text);
        assert!(splits.len() > 1);
        // Each chunk after the first starts with material from its predecessor.
        for pair in splits.windows(2) {
            let first_line = pair[1].text.split("\n\n").next().unwrap();
            assert!(
                pair[0].text.contains(first_line),
                "expected '{}' to overlap previous chunk",
                first_line
            );
        }
    }

    #[test]
    fn tables_survive_small_chunk_sizes() {
        let table = "| name | qty |\n| --- | --- |\n| bolts | 40 |\n| nuts | 90 |";
        let text = format!("# Inventory\n\nintro words before the table\n\n{table}\n\nclosing remarks\n");
        let splits = splitter(10, 0).split(&text);

        let with_table: Vec<&Split> = splits
            .iter()
            .filter(|split| split.text.contains('|'))
            .collect();
        assert_eq!(with_table.len(), 1, "table should land in exactly one chunk");
        assert!(with_table[0].text.contains("| bolts | 40 |"));
        assert!(with_table[0].text.contains("| nuts | 90 |"));
        // No placeholder left behind.
        for split in &splits {
            assert!(!split.text.contains("{table_"));
        }
    }

    #[test]
    fn table_preservation_can_be_disabled() {
        let counter: Arc<dyn crate::tokenizer::TokenCounter> = Arc::new(HeuristicCounter);
        let splitter = MarkdownSplitter::new(6, 0, false, counter);
        let table = "| a | b |\n| --- | --- |\n| one two three | four five six |\n| seven eight | nine ten |";
        let splits = splitter.split(table);
        // Without preservation the table may be cut across chunks.
        assert!(splits.len() > 1);
    }

    #[test]
    fn fenced_code_is_not_sectioned() {
        let text = "# Top\n\n```\n# comment in code\n```\n\nafter\n";
        let splits = splitter(256, 0).split(text);
        assert_eq!(splits.len(), 1);
        assert!(splits[0].text.contains("# comment in code"));
        assert!(splits[0].text.contains("after"));
    }

    #[test]
    fn token_counts_are_recomputed_after_restore() {
        let table = "| a | b |\n| --- | --- |\n| long cell content here | more content |";
        let text = format!("words before\n\n{table}\n");
        let splits = splitter(256, 0).split(&text);
        for split in &splits {
            assert_eq!(split.token_count, HeuristicCounter.count(&split.text));
        }
    }
}
