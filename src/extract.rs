// src/extract.rs

//! Content extraction
//!
//! The core treats extraction as an opaque collaborator: given a path it
//! gets back a bounded text preview, a small metadata map, and a detected
//! document type. Extraction never fails — any problem yields an empty
//! preview with `DocType::Unknown` so a single unreadable file cannot
//! derail a scan.
//!
//! The bundled `TextExtractor` handles plain-text formats and classifies
//! binary formats by extension without opening them. Richer extraction
//! (PDF text, OCR) plugs in behind the same trait.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Preview text is capped at 1 KiB
pub const MAX_PREVIEW_BYTES: usize = 1024;

/// Detected document type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Document,
    Spreadsheet,
    Text,
    Image,
    Email,
    #[default]
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Text => "text",
            Self::Image => "image",
            Self::Email => "email",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of extracting one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extracted {
    /// Text preview, at most [`MAX_PREVIEW_BYTES`] bytes of valid UTF-8
    pub preview: String,
    /// Small string-to-string metadata map
    pub metadata: BTreeMap<String, String>,
    pub doc_type: DocType,
}

/// Opaque content-extraction collaborator
pub trait Extractor: Send + Sync {
    /// Extract a preview from `path`. Must not fail; on any problem return
    /// an `Extracted` with an empty preview and `DocType::Unknown`.
    fn extract(&self, path: &Path) -> Extracted;
}

/// Extractor for plain-text formats; binary formats are typed by extension
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    fn doc_type_for_extension(ext: &str) -> DocType {
        match ext {
            "pdf" => DocType::Pdf,
            "doc" | "docx" | "odt" | "rtf" => DocType::Document,
            "xlsx" | "xls" | "csv" | "ods" => DocType::Spreadsheet,
            "txt" | "md" | "log" | "py" | "js" | "java" | "cpp" | "c" | "h" | "go" | "rs" => {
                DocType::Text
            }
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" => DocType::Image,
            "eml" => DocType::Email,
            _ => DocType::Unknown,
        }
    }

    /// Binary container formats get no preview from this extractor
    fn is_text_like(doc_type: DocType, ext: &str) -> bool {
        match doc_type {
            DocType::Text | DocType::Email => true,
            DocType::Spreadsheet => ext == "csv",
            DocType::Unknown => true,
            _ => false,
        }
    }

    fn read_preview(path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut buf = vec![0u8; MAX_PREVIEW_BYTES];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return None,
            }
        }
        buf.truncate(filled);

        // NUL bytes mean binary content, not a preview
        if buf.contains(&0) {
            return None;
        }

        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            // A multi-byte sequence cut at the 1 KiB boundary is fine;
            // anything else is binary
            Err(err) => {
                let valid = err.utf8_error().valid_up_to();
                if valid + 3 < err.as_bytes().len() {
                    return None;
                }
                let mut bytes = err.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).ok()?
            }
        };

        Some(text)
    }
}

impl Extractor for TextExtractor {
    fn extract(&self, path: &Path) -> Extracted {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let mut doc_type = Self::doc_type_for_extension(&ext);
        let mut metadata = BTreeMap::new();
        if !ext.is_empty() {
            metadata.insert("extension".to_string(), ext.clone());
        }

        let mut preview = String::new();
        if Self::is_text_like(doc_type, &ext) {
            if let Some(text) = Self::read_preview(path) {
                metadata.insert(
                    "preview_lines".to_string(),
                    text.lines().count().to_string(),
                );
                // An unknown extension that reads as text is text
                if doc_type == DocType::Unknown && !text.is_empty() {
                    doc_type = DocType::Text;
                }
                preview = text;
            }
        }

        Extracted {
            preview,
            metadata,
            doc_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_file_preview_and_type() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "Quarterly Report\nline two\n").unwrap();

        let out = TextExtractor.extract(&path);
        assert_eq!(out.doc_type, DocType::Text);
        assert_eq!(out.preview, "Quarterly Report\nline two\n");
        assert_eq!(out.metadata.get("preview_lines").unwrap(), "2");
    }

    #[test]
    fn test_preview_is_capped_at_1_kib() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.txt");
        std::fs::write(&path, "x".repeat(5000)).unwrap();

        let out = TextExtractor.extract(&path);
        assert_eq!(out.preview.len(), MAX_PREVIEW_BYTES);
    }

    #[test]
    fn test_binary_extensions_get_no_preview() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4 not actually parsed").unwrap();

        let out = TextExtractor.extract(&path);
        assert_eq!(out.doc_type, DocType::Pdf);
        assert!(out.preview.is_empty());
    }

    #[test]
    fn test_csv_reads_as_spreadsheet_with_preview() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("budget.csv");
        std::fs::write(&path, "item,amount\nrent,1200\n").unwrap();

        let out = TextExtractor.extract(&path);
        assert_eq!(out.doc_type, DocType::Spreadsheet);
        assert!(out.preview.contains("rent"));
    }

    #[test]
    fn test_missing_file_yields_empty_unknown() {
        let out = TextExtractor.extract(Path::new("/nonexistent/nope.zzz"));
        assert_eq!(out.doc_type, DocType::Unknown);
        assert!(out.preview.is_empty());
    }

    #[test]
    fn test_binary_content_with_unknown_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.dat");
        std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let out = TextExtractor.extract(&path);
        assert_eq!(out.doc_type, DocType::Unknown);
        assert!(out.preview.is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.md");
        std::fs::write(&path, "# heading").unwrap();

        let first = TextExtractor.extract(&path);
        let second = TextExtractor.extract(&path);
        assert_eq!(first.preview, second.preview);
        assert_eq!(first.doc_type, second.doc_type);
        assert_eq!(first.metadata, second.metadata);
    }
}
