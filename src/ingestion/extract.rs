//! Format detection and structure-preserving text extraction.
//!
//! Every extractor emits Markdown so the rest of the pipeline only deals
//! with one representation. Headings and tables survive extraction where
//! the source format carries them; the actual parsing is delegated to
//! `scraper`, `pdf-extract`/`lopdf`, and `docx-rs`.
//!
//! Extractors are synchronous and CPU-bound; the pipeline runs them under
//! `tokio::task::spawn_blocking`.

use std::path::Path;

use scraper::{ElementRef, Html, Node, Selector};

use crate::types::RagError;

/// Supported input formats, detected from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.md` — passed through untouched.
    Markdown,
    /// `.pdf` — text extraction with a page-stream fallback.
    Pdf,
    /// `.html` / `.htm` — DOM walk emitting Markdown.
    Html,
    /// `.doc` / `.docx` — paragraph/table walk emitting Markdown.
    Docx,
}

impl SourceFormat {
    /// Detects the format from a path extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "html" | "htm" => Some(Self::Html),
            "doc" | "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Docx => "docx",
        }
    }
}

/// Resolves the format for `path`, or an `UnsupportedFormat` error.
pub fn detect_format(path: &Path) -> Result<SourceFormat, RagError> {
    SourceFormat::from_path(path).ok_or_else(|| RagError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

/// Extracts Markdown text from `path` according to `format`.
pub fn extract(format: SourceFormat, path: &Path) -> Result<String, RagError> {
    match format {
        SourceFormat::Markdown => Ok(std::fs::read_to_string(path)?),
        SourceFormat::Html => {
            let html = std::fs::read_to_string(path)?;
            Ok(html_to_markdown(&html))
        }
        SourceFormat::Pdf => extract_pdf(path),
        SourceFormat::Docx => extract_docx(path),
    }
}

fn extraction_error(path: &Path, message: impl ToString) -> RagError {
    RagError::Extraction {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

const SKIP_TAGS: &[&str] = &["script", "style", "head", "noscript", "nav", "template"];

/// Converts an HTML document into Markdown, keeping headings, lists,
/// tables, and fenced code blocks.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());
    let root = body.unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    render_block(root, &mut out);
    collapse_blank_lines(out.trim())
}

fn render_block(element: ElementRef, out: &mut String) {
    let mut paragraph = String::new();

    for node in element.children() {
        match node.value() {
            Node::Text(text) => paragraph.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(node) else {
                    continue;
                };
                let tag = child.value().name();
                if SKIP_TAGS.contains(&tag) {
                    continue;
                }
                match tag {
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        flush_paragraph(&mut paragraph, out);
                        let level = tag[1..].parse::<usize>().unwrap_or(1);
                        let title = inline_text(child);
                        if !title.is_empty() {
                            out.push_str(&"#".repeat(level));
                            out.push(' ');
                            out.push_str(&title);
                            out.push_str("\n\n");
                        }
                    }
                    "p" => {
                        flush_paragraph(&mut paragraph, out);
                        let text = inline_text(child);
                        if !text.is_empty() {
                            out.push_str(&text);
                            out.push_str("\n\n");
                        }
                    }
                    "ul" | "ol" => {
                        flush_paragraph(&mut paragraph, out);
                        render_list(child, out, 0, tag == "ol");
                        out.push('\n');
                    }
                    "table" => {
                        flush_paragraph(&mut paragraph, out);
                        render_table(child, out);
                    }
                    "pre" => {
                        flush_paragraph(&mut paragraph, out);
                        let code: String = child.text().collect();
                        out.push_str("```\n");
                        out.push_str(code.trim_end());
                        out.push_str("\n```\n\n");
                    }
                    "blockquote" => {
                        flush_paragraph(&mut paragraph, out);
                        let text = inline_text(child);
                        if !text.is_empty() {
                            out.push_str("> ");
                            out.push_str(&text);
                            out.push_str("\n\n");
                        }
                    }
                    "br" => paragraph.push('\n'),
                    "hr" => {
                        flush_paragraph(&mut paragraph, out);
                        out.push_str("---\n\n");
                    }
                    "a" | "span" | "strong" | "em" | "b" | "i" | "code" | "small" | "sub"
                    | "sup" | "u" => {
                        paragraph.push(' ');
                        paragraph.push_str(&inline_text(child));
                        paragraph.push(' ');
                    }
                    _ => {
                        // Generic container (div, section, article, ...).
                        flush_paragraph(&mut paragraph, out);
                        render_block(child, out);
                    }
                }
            }
            _ => {}
        }
    }

    flush_paragraph(&mut paragraph, out);
}

fn flush_paragraph(paragraph: &mut String, out: &mut String) {
    let text = normalize_whitespace(paragraph);
    if !text.is_empty() {
        out.push_str(&text);
        out.push_str("\n\n");
    }
    paragraph.clear();
}

fn render_list(list: ElementRef, out: &mut String, depth: usize, ordered: bool) {
    let mut index = 1usize;
    for node in list.children() {
        let Some(item) = ElementRef::wrap(node) else {
            continue;
        };
        if item.value().name() != "li" {
            continue;
        }

        let text = normalize_whitespace(&item_own_text(item));
        if !text.is_empty() {
            out.push_str(&"  ".repeat(depth));
            if ordered {
                out.push_str(&format!("{index}. "));
            } else {
                out.push_str("- ");
            }
            out.push_str(&text);
            out.push('\n');
            index += 1;
        }

        for nested in item.children() {
            let Some(child) = ElementRef::wrap(nested) else {
                continue;
            };
            let tag = child.value().name();
            if tag == "ul" || tag == "ol" {
                render_list(child, out, depth + 1, tag == "ol");
            }
        }
    }
}

/// Text of a list item excluding any nested lists.
fn item_own_text(item: ElementRef) -> String {
    let mut text = String::new();
    for node in item.children() {
        match node.value() {
            Node::Text(fragment) => text.push_str(fragment),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(node) {
                    let tag = child.value().name();
                    if tag != "ul" && tag != "ol" {
                        text.push(' ');
                        text.push_str(&inline_text(child));
                        text.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn render_table(table: ElementRef, out: &mut String) {
    let Ok(row_selector) = Selector::parse("tr") else {
        return;
    };
    let Ok(cell_selector) = Selector::parse("th, td") else {
        return;
    };

    let rows: Vec<Vec<String>> = table
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| inline_text(cell).replace('|', "\\|"))
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();

    if rows.is_empty() {
        return;
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    for (index, cells) in rows.iter().enumerate() {
        out.push('|');
        for column in 0..columns {
            out.push(' ');
            out.push_str(cells.get(column).map(String::as_str).unwrap_or(""));
            out.push_str(" |");
        }
        out.push('\n');
        if index == 0 {
            out.push('|');
            for _ in 0..columns {
                out.push_str(" --- |");
            }
            out.push('\n');
        }
    }
    out.push('\n');
}

fn inline_text(element: ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

fn extract_pdf(path: &Path) -> Result<String, RagError> {
    let bytes = std::fs::read(path)?;
    let raw = match pdf_extract::extract_text_from_mem(&bytes) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "pdf-extract failed, trying lopdf fallback");
            extract_pdf_fallback(path, &bytes)?
        }
    };

    let cleaned = cleanup_extracted_text(&raw);
    if cleaned.trim().is_empty() {
        return Err(extraction_error(path, "no text content could be extracted"));
    }
    Ok(cleaned)
}

fn extract_pdf_fallback(path: &Path, bytes: &[u8]) -> Result<String, RagError> {
    let document = lopdf::Document::load_mem(bytes).map_err(|err| extraction_error(path, err))?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    document
        .extract_text(&pages)
        .map_err(|err| extraction_error(path, err))
}

/// Strips control characters and collapses the whitespace PDF extraction
/// tends to leave behind.
fn cleanup_extracted_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    collapse_blank_lines(&cleaned)
}

// ---------------------------------------------------------------------------
// DOCX
// ---------------------------------------------------------------------------

fn extract_docx(path: &Path) -> Result<String, RagError> {
    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|err| extraction_error(path, err))?;

    let mut out = String::new();
    for child in docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => {
                render_docx_paragraph(&paragraph, &mut out);
            }
            docx_rs::DocumentChild::Table(table) => {
                render_docx_table(&table, &mut out);
            }
            _ => {}
        }
    }

    let text = collapse_blank_lines(&out);
    if text.trim().is_empty() {
        return Err(extraction_error(path, "document contains no text"));
    }
    Ok(text)
}

fn render_docx_paragraph(paragraph: &docx_rs::Paragraph, out: &mut String) {
    let text = docx_paragraph_text(paragraph);
    if text.trim().is_empty() {
        return;
    }
    if let Some(level) = docx_heading_level(paragraph) {
        out.push_str(&"#".repeat(level.min(6)));
        out.push(' ');
    }
    out.push_str(text.trim());
    out.push_str("\n\n");
}

/// Maps `Heading<N>` paragraph styles to Markdown heading levels.
fn docx_heading_level(paragraph: &docx_rs::Paragraph) -> Option<usize> {
    let style = paragraph.property.style.as_ref()?;
    let digits = style.val.strip_prefix("Heading")?.trim();
    let level = digits.parse::<usize>().ok()?;
    (1..=9).contains(&level).then_some(level)
}

fn docx_paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(fragment) => text.push_str(&fragment.text),
                    docx_rs::RunChild::Tab(_) => text.push(' '),
                    docx_rs::RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

fn render_docx_table(table: &docx_rs::Table, out: &mut String) {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row;
        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell;
            let mut cell_text = String::new();
            for content in &cell.children {
                if let docx_rs::TableCellContent::Paragraph(paragraph) = content {
                    if !cell_text.is_empty() {
                        cell_text.push(' ');
                    }
                    cell_text.push_str(docx_paragraph_text(paragraph).trim());
                }
            }
            cells.push(cell_text.replace('|', "\\|"));
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    if rows.is_empty() {
        return;
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    for (index, cells) in rows.iter().enumerate() {
        out.push('|');
        for column in 0..columns {
            out.push(' ');
            out.push_str(cells.get(column).map(String::as_str).unwrap_or(""));
            out.push_str(" |");
        }
        out.push('\n');
        if index == 0 {
            out.push('|');
            for _ in 0..columns {
                out.push_str(" --- |");
            }
            out.push('\n');
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a.MD")),
            Some(SourceFormat::Markdown)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("b.PDF")),
            Some(SourceFormat::Pdf)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("c.htm")),
            Some(SourceFormat::Html)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("d.docx")),
            Some(SourceFormat::Docx)
        );
        assert_eq!(SourceFormat::from_path(Path::new("e.txt")), None);
        assert_eq!(SourceFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn detect_format_reports_extension() {
        let err = detect_format(Path::new("report.xlsx")).unwrap_err();
        match err {
            RagError::UnsupportedFormat { extension, .. } => assert_eq!(extension, "xlsx"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn html_headings_and_paragraphs() {
        let html = r##"
            <html><head><title>ignored</title><script>var x = 1;</script></head>
            <body>
                <h1>Guide</h1>
                <p>First   paragraph
                   spanning lines.</p>
                <h2>Details</h2>
                <p>Second paragraph with a <a href="#">link</a>.</p>
            </body></html>
        "##;
        let markdown = html_to_markdown(html);
        assert!(markdown.starts_with("# Guide\n"));
        assert!(markdown.contains("First paragraph spanning lines."));
        assert!(markdown.contains("## Details"));
        assert!(markdown.contains("link"));
        assert!(!markdown.contains("var x"));
        assert!(!markdown.contains("ignored"));
    }

    #[test]
    fn html_lists_become_markdown_items() {
        let html = r#"<body><ul><li>alpha</li><li>beta<ul><li>nested</li></ul></li></ul>
            <ol><li>one</li><li>two</li></ol></body>"#;
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("- alpha"));
        assert!(markdown.contains("- beta"));
        assert!(markdown.contains("  - nested"));
        assert!(markdown.contains("1. one"));
        assert!(markdown.contains("2. two"));
    }

    #[test]
    fn html_tables_become_pipe_tables() {
        let html = r#"<body><table>
            <tr><th>Name</th><th>Value</th></tr>
            <tr><td>alpha</td><td>1</td></tr>
        </table></body>"#;
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("| Name | Value |"));
        assert!(markdown.contains("| --- | --- |"));
        assert!(markdown.contains("| alpha | 1 |"));
    }

    #[test]
    fn html_pre_blocks_are_fenced() {
        let html = "<body><pre>let x = 1;\nlet y = 2;</pre></body>";
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("```\nlet x = 1;\nlet y = 2;\n```"));
    }

    #[test]
    fn pdf_garbage_is_an_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();
        let err = extract(SourceFormat::Pdf, &path).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[test]
    fn docx_roundtrip_preserves_headings() {
        use docx_rs::{Docx, Paragraph, Run};

        let dir = tempdir().unwrap();
        let path: PathBuf = dir.path().join("sample.docx");

        let mut buffer = Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(
                Paragraph::new()
                    .style("Heading1")
                    .add_run(Run::new().add_text("Overview")),
            )
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Body text here.")))
            .build()
            .pack(&mut buffer)
            .unwrap();
        std::fs::write(&path, buffer.into_inner()).unwrap();

        let markdown = extract(SourceFormat::Docx, &path).unwrap();
        assert!(markdown.contains("# Overview"));
        assert!(markdown.contains("Body text here."));
    }

    #[test]
    fn cleanup_collapses_blank_runs() {
        let raw = "line one\n\n\n\nline two\u{0}\nline three";
        let cleaned = cleanup_extracted_text(raw);
        assert_eq!(cleaned, "line one\n\nline two\nline three");
    }
}
