//! Multi-format document conversion: binary extraction (PDF, OOXML) plus
//! text-format pass-through and markdown-vs-plain-text selection.
//!
//! Extraction is pipeline-layer: connectors supply bytes + content-type;
//! [`convert_document`] returns canonical UTF-8 text and the
//! [`ConversionMethod`] chosen for it (SPEC_FULL §4.2).

use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ConversionMethod;

/// Supported MIME types for extraction.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_HTML: &str = "text/html";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_ASCIIDOC: &str = "text/asciidoc";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_JSON: &str = "application/json";
pub const MIME_XML: &str = "application/xml";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_TIFF: &str = "image/tiff";
pub const MIME_BMP: &str = "image/bmp";
pub const MIME_WEBP: &str = "image/webp";

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum rows to process per sheet (avoids unbounded memory).
const XLSX_MAX_ROWS_PER_SHEET: usize = 10_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error (spec §5.1: no panic; return error and pipeline skips item).
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from binary content. Returns UTF-8 string or error.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx_markdown(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Convert a source item's bytes into canonical text plus the
/// [`ConversionMethod`] chosen for it. This is the entry point C2 exposes to
/// the ingestion pipeline; `extract_text` above remains for binary formats
/// whose conversion requires no format-selection step.
pub fn convert_document(bytes: &[u8], content_type: &str) -> Result<(String, ConversionMethod), ExtractError> {
    let text = match content_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX => extract_docx(bytes)?,
        MIME_PPTX => extract_pptx(bytes)?,
        MIME_XLSX => extract_xlsx_markdown(bytes)?,
        MIME_HTML => extract_html(bytes),
        MIME_TEXT | MIME_MARKDOWN | MIME_ASCIIDOC | MIME_JSON | MIME_XML => {
            decode_utf8_lossy(bytes)
        }
        MIME_CSV => csv_to_markdown_table(bytes),
        MIME_PNG | MIME_JPEG | MIME_TIFF | MIME_BMP | MIME_WEBP => {
            tracing::warn!(content_type, "OCR not available; image produces an empty body");
            String::new()
        }
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };
    let method = detect_conversion_method(&text);
    Ok((text, method))
}

/// Selects markdown iff a pipe `|` and a header-rule `---` both occur in the
/// text (SPEC_FULL §4.2); otherwise plain text.
pub fn detect_conversion_method(text: &str) -> ConversionMethod {
    if text.contains('|') && text.contains("---") {
        ConversionMethod::Markdown
    } else {
        ConversionMethod::PlainText
    }
}

fn decode_utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Ooxml(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"t" {
                    // empty t, nothing to add
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_a_t_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_a_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Renders each worksheet as a markdown table (first row as header, `---`
/// separator), which is how this converter satisfies the table-marker
/// detection in [`detect_conversion_method`] for spreadsheet input.
fn extract_xlsx_markdown(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&mut archive)?;
    let mut out = String::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = extract_xlsx_sheet_rows(&sheet_xml, &shared_strings)?;
        let table = rows_to_markdown_table(&rows);
        if !out.is_empty() && !table.is_empty() {
            out.push('\n');
        }
        out.push_str(&table);
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    Ok(names)
}

/// Parse a worksheet XML part into rows of cell strings, resolving
/// shared-string indices and passing inline numeric/text values through.
fn extract_xlsx_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    let mut row_count = 0usize;
    loop {
        if row_count >= XLSX_MAX_ROWS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => current_row = Vec::new(),
                b"c" => {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim().to_string();
                if cell_is_shared_str {
                    let resolved = s
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default();
                    current_row.push(resolved);
                } else {
                    current_row.push(s);
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"row" => {
                    rows.push(std::mem::take(&mut current_row));
                    row_count += 1;
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Render rows as a GitHub-flavored markdown table, padding ragged rows to
/// the widest row's column count and inserting a `---` header rule after
/// the first row.
fn rows_to_markdown_table(rows: &[Vec<String>]) -> String {
    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..col_count)
            .map(|c| row.get(c).cloned().unwrap_or_default())
            .collect();
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
        if i == 0 {
            let sep = vec!["---"; col_count].join(" | ");
            out.push_str("| ");
            out.push_str(&sep);
            out.push_str(" |\n");
        }
    }
    out
}

static SCRIPT_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap());
static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<table[^>]*>(.*?)</table>").unwrap());
static TR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());
static CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn decode_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn strip_tags(fragment: &str) -> String {
    let no_tags = TAG_RE.replace_all(fragment, " ");
    let decoded = decode_html_entities(&no_tags);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn table_to_markdown(table_html: &str) -> String {
    let mut out = String::new();
    for (row_idx, tr_cap) in TR_RE.captures_iter(table_html).enumerate() {
        let row_html = &tr_cap[1];
        let cells: Vec<String> = CELL_RE
            .captures_iter(row_html)
            .map(|c| strip_tags(&c[1]))
            .collect();
        if cells.is_empty() {
            continue;
        }
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
        if row_idx == 0 {
            let sep = vec!["---"; cells.len()].join(" | ");
            out.push_str("| ");
            out.push_str(&sep);
            out.push_str(" |\n");
        }
    }
    out
}

/// Extract visible text from HTML, rendering any `<table>` elements as
/// markdown tables and stripping all other tags to prose.
fn extract_html(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    let cleaned = SCRIPT_STYLE_RE.replace_all(&raw, "");

    if !TABLE_RE.is_match(&cleaned) {
        return strip_tags(&cleaned);
    }

    let mut out = String::new();
    let mut last_end = 0;
    for cap in TABLE_RE.captures_iter(&cleaned) {
        let whole = cap.get(0).unwrap();
        let before = strip_tags(&cleaned[last_end..whole.start()]);
        if !before.is_empty() {
            out.push_str(&before);
            out.push('\n');
        }
        out.push_str(&table_to_markdown(&cap[1]));
        last_end = whole.end();
    }
    let after = strip_tags(&cleaned[last_end..]);
    if !after.is_empty() {
        out.push_str(&after);
    }
    out
}

/// Render CSV as a markdown table. Uses naive comma-splitting (no quoted-field
/// escaping); no CSV parser crate appears anywhere in the retrieval pack.
fn csv_to_markdown_table(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let rows: Vec<Vec<String>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(',').map(|cell| cell.trim().to_string()).collect())
        .collect();
    rows_to_markdown_table(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn plain_text_passes_through_as_plain_text_method() {
        let (text, method) = convert_document(b"Hello, world.", MIME_TEXT).unwrap();
        assert_eq!(text, "Hello, world.");
        assert_eq!(method, ConversionMethod::PlainText);
    }

    #[test]
    fn csv_converts_to_markdown_table() {
        let (text, method) = convert_document(b"name,age\nAda,36\nAlan,41", MIME_CSV).unwrap();
        assert!(text.contains("| name | age |"));
        assert!(text.contains("---"));
        assert_eq!(method, ConversionMethod::Markdown);
    }

    #[test]
    fn html_without_table_is_plain_text() {
        let (text, method) = convert_document(b"<p>Hello <b>world</b></p>", MIME_HTML).unwrap();
        assert_eq!(text.trim(), "Hello world");
        assert_eq!(method, ConversionMethod::PlainText);
    }

    #[test]
    fn html_table_becomes_markdown() {
        let html = b"<html><body><table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table></body></html>";
        let (text, method) = convert_document(html, MIME_HTML).unwrap();
        assert!(text.contains("| A | B |"));
        assert!(text.contains("---"));
        assert_eq!(method, ConversionMethod::Markdown);
    }

    #[test]
    fn image_mime_produces_empty_body() {
        let (text, _method) = convert_document(b"\x89PNG", MIME_PNG).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn unsupported_mime_is_skipped_with_error() {
        let err = convert_document(b"???", "application/x-unknown").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn detect_conversion_method_requires_both_markers() {
        assert_eq!(detect_conversion_method("a | b"), ConversionMethod::PlainText);
        assert_eq!(detect_conversion_method("just prose, no markers"), ConversionMethod::PlainText);
        assert_eq!(detect_conversion_method("| a | b |\n| --- | --- |"), ConversionMethod::Markdown);
    }
}
