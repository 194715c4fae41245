//! Document source connectors (C1).
//!
//! Each connector enumerates items from one source kind and fetches their raw
//! bytes eagerly into a [`SourceItem`] (the corpora this crate targets are
//! local/small enough that eager enumeration suffices; a streaming variant is
//! a documented non-blocking extension, not implemented here).

pub mod alfresco;
pub mod cmis;
pub mod fs;
mod http_walk;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceItem;

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    async fn scan(&self) -> Result<Vec<SourceItem>>;
}

/// Strip a single layer of matching surrounding quotes, as when a caller
/// pastes a quoted path into configuration (SPEC_FULL §4.1).
pub fn strip_quotes(path: &str) -> &str {
    let trimmed = path.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Map a lowercase, dot-prefixed file extension to the MIME type the
/// converter (C2) understands, or `None` if unsupported.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        ".pdf" => Some(crate::extract::MIME_PDF),
        ".docx" => Some(crate::extract::MIME_DOCX),
        ".pptx" => Some(crate::extract::MIME_PPTX),
        ".xlsx" => Some(crate::extract::MIME_XLSX),
        ".html" | ".htm" => Some(crate::extract::MIME_HTML),
        ".txt" => Some(crate::extract::MIME_TEXT),
        ".md" | ".markdown" => Some(crate::extract::MIME_MARKDOWN),
        ".adoc" | ".asciidoc" => Some(crate::extract::MIME_ASCIIDOC),
        ".csv" => Some(crate::extract::MIME_CSV),
        ".json" => Some(crate::extract::MIME_JSON),
        ".xml" => Some(crate::extract::MIME_XML),
        ".png" => Some(crate::extract::MIME_PNG),
        ".jpg" | ".jpeg" => Some(crate::extract::MIME_JPEG),
        ".tif" | ".tiff" => Some(crate::extract::MIME_TIFF),
        ".bmp" => Some(crate::extract::MIME_BMP),
        ".webp" => Some(crate::extract::MIME_WEBP),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_matching_quotes() {
        assert_eq!(strip_quotes("\"./docs\""), "./docs");
        assert_eq!(strip_quotes("'./docs'"), "./docs");
        assert_eq!(strip_quotes("./docs"), "./docs");
        assert_eq!(strip_quotes("\"./docs'"), "\"./docs'");
    }

    #[test]
    fn maps_known_extensions() {
        assert_eq!(mime_for_extension(".pdf"), Some(crate::extract::MIME_PDF));
        assert_eq!(mime_for_extension(".unknown"), None);
    }
}
