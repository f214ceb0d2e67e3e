//! Markdown heading normalization.
//!
//! Extractors and real-world Markdown both produce ragged heading levels
//! (a lone `####` under an `h1`, decorative deep nesting, and so on). The
//! normalizer rewrites heading lines so the splitter sees a consistent
//! hierarchy: either by clamping levels to a configured maximum, or by
//! asking an OpenAI-compatible model to reassign levels and falling back
//! to clamping when that fails.

pub mod llm;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use llm::HeadingCorrectionClient;

/// A Markdown heading: its text without the leading hashes, and its level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading text with `#` markers and surrounding whitespace stripped.
    pub text: String,
    /// Heading depth (number of `#` characters).
    pub level: usize,
}

/// Rewrites Markdown heading levels into a consistent hierarchy.
pub struct HeaderNormalizer {
    max_heading_level: usize,
    client: Option<HeadingCorrectionClient>,
}

impl HeaderNormalizer {
    /// Creates a normalizer that clamps to `max_heading_level`, optionally
    /// trying an LLM first.
    pub fn new(max_heading_level: usize, llm: Option<LlmConfig>) -> Self {
        Self {
            max_heading_level,
            client: llm.map(HeadingCorrectionClient::new),
        }
    }

    /// Normalizes every heading line in `text`, returning the rewritten
    /// document. Text without headings is returned unchanged.
    pub async fn normalize(&self, text: &str) -> String {
        let headings = collect_headings(text);
        if headings.is_empty() {
            return text.to_string();
        }

        let corrected = match &self.client {
            Some(client) => match client.correct(&headings).await {
                Ok(corrected) if corrected.len() == headings.len() => Some(corrected),
                Ok(corrected) => {
                    tracing::warn!(
                        expected = headings.len(),
                        received = corrected.len(),
                        "LLM returned wrong heading count, falling back to clamping"
                    );
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "LLM heading correction failed, falling back to clamping");
                    None
                }
            },
            None => None,
        };

        let corrected = corrected.unwrap_or_else(|| self.clamp(&headings));
        rewrite_headings(text, &corrected)
    }

    /// Deterministic strategy: clamp each level to the configured maximum.
    fn clamp(&self, headings: &[Heading]) -> Vec<Heading> {
        headings
            .iter()
            .map(|heading| Heading {
                text: heading.text.clone(),
                level: heading.level.min(self.max_heading_level),
            })
            .collect()
    }
}

/// Collects headings from `text`, skipping fenced code blocks.
pub fn collect_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(heading) = parse_heading(line) {
            headings.push(heading);
        }
    }
    headings
}

fn parse_heading(line: &str) -> Option<Heading> {
    if !line.starts_with('#') {
        return None;
    }
    let level = line.chars().take_while(|c| *c == '#').count();
    let text = line[level..].trim().to_string();
    Some(Heading { text, level })
}

/// Rewrites heading lines in order, leaving everything else untouched.
///
/// Replacement is line-wise rather than by substring search, so duplicate
/// headings and a heading on the first line are both handled correctly.
fn rewrite_headings(text: &str, corrected: &[Heading]) -> String {
    let mut replacements = corrected.iter();
    let mut in_fence = false;
    let mut out_lines: Vec<String> = Vec::new();

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out_lines.push(line.to_string());
            continue;
        }
        if !in_fence && line.starts_with('#') {
            if let Some(heading) = replacements.next() {
                out_lines.push(format!("{} {}", "#".repeat(heading.level), heading.text));
                continue;
            }
        }
        out_lines.push(line.to_string());
    }

    let mut out = out_lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clamping_limits_depth() {
        let normalizer = HeaderNormalizer::new(3, None);
        let input = "# One\n\nbody\n\n#### Deep\n\nmore\n";
        let output = normalizer.normalize(input).await;
        assert!(output.contains("# One\n"));
        assert!(output.contains("### Deep\n"));
        assert!(!output.contains("#### Deep"));
        assert!(output.contains("body"));
    }

    #[tokio::test]
    async fn text_without_headings_is_untouched() {
        let normalizer = HeaderNormalizer::new(3, None);
        let input = "plain text\nwith lines\n";
        assert_eq!(normalizer.normalize(input).await, input);
    }

    #[tokio::test]
    async fn first_line_heading_is_rewritten() {
        let normalizer = HeaderNormalizer::new(2, None);
        let output = normalizer.normalize("### Top\nbody").await;
        assert!(output.starts_with("## Top\n"));
    }

    #[tokio::test]
    async fn duplicate_headings_stay_in_order() {
        let normalizer = HeaderNormalizer::new(2, None);
        let input = "#### Setup\na\n#### Setup\nb\n";
        let output = normalizer.normalize(input).await;
        assert_eq!(output.matches("## Setup").count(), 2);
    }

    #[test]
    fn fenced_hashes_are_not_headings() {
        let text = "# Real\n```\n# not a heading\n```\n## Also real\n";
        let headings = collect_headings(text);
        assert_eq!(
            headings,
            vec![
                Heading {
                    text: "Real".into(),
                    level: 1
                },
                Heading {
                    text: "Also real".into(),
                    level: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn fenced_blocks_survive_rewrite() {
        let normalizer = HeaderNormalizer::new(1, None);
        let input = "## Title\n```\n#### code comment\n```\n";
        let output = normalizer.normalize(input).await;
        assert!(output.contains("# Title"));
        assert!(output.contains("#### code comment"));
    }
}
