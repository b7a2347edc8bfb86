//! Export document generators.
//!
//! Each generator takes a book, the owner's author name and the ordered
//! chapter list, and produces the complete output bytes. Range filtering
//! and ownership checks happen before the generator runs; a generator
//! never touches the database.

pub mod docx;
pub mod epub;
pub mod html;
pub mod pdf;

use crate::db::{Book, Chapter, timestamp_to_datetime};
use crate::error::{AppError, Result};
use chrono::Utc;
use serde_json::json;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Single HTML document with inline CSS.
    Html,
    /// Real PDF document.
    Pdf,
    /// EPUB archive.
    Epub,
    /// Minimal DOCX archive.
    Docx,
    /// Structural JSON dump.
    Json,
}

impl ExportFormat {
    /// Parse a format keyword from the request.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            "docx" => Some(Self::Docx),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Docx => "docx",
            Self::Json => "json",
        }
    }

    /// Content-Type header value.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Pdf => "application/pdf",
            Self::Epub => "application/epub+zip",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Json => "application/json",
        }
    }
}

/// A finished export.
pub struct ExportOutput {
    /// Generated bytes.
    pub bytes: Vec<u8>,
    /// Content-Type header value.
    pub content_type: &'static str,
    /// Attachment filename.
    pub filename: String,
}

/// Escape `&`, `<` and `>` for XML/HTML text content.
pub fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Reduce a book title to a safe filename stem. Non-alphanumeric runs
/// collapse to single dashes; an empty result falls back to "book".
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "book".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Attachment filename: sanitized title plus the current date.
pub fn export_filename(title: &str, format: ExportFormat) -> String {
    format!(
        "{}-{}.{}",
        sanitize_title(title),
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    )
}

/// Generate an export in the requested format.
pub fn generate(
    book: &Book,
    owner_name: &str,
    chapters: &[Chapter],
    format: ExportFormat,
) -> Result<ExportOutput> {
    let bytes = match format {
        ExportFormat::Html => html::generate_html(book, owner_name, chapters).into_bytes(),
        ExportFormat::Pdf => pdf::generate_pdf(book, owner_name, chapters)?,
        ExportFormat::Epub => epub::generate_epub(book, owner_name, chapters)?,
        ExportFormat::Docx => docx::generate_docx(book, owner_name, chapters)?,
        ExportFormat::Json => generate_json(book, owner_name, chapters)?,
    };

    Ok(ExportOutput {
        bytes,
        content_type: format.content_type(),
        filename: export_filename(&book.title, format),
    })
}

/// Structural dump of the book and its chapters with export metadata.
fn generate_json(book: &Book, owner_name: &str, chapters: &[Chapter]) -> Result<Vec<u8>> {
    let value = json!({
        "export": {
            "version": "1.0",
            "exported_at": Utc::now().to_rfc3339(),
            "author": owner_name,
        },
        "book": {
            "id": book.id,
            "title": book.title,
            "description": book.description,
            "status": book.status.as_str(),
            "created_at": timestamp_to_datetime(book.created_at).to_rfc3339(),
            "updated_at": timestamp_to_datetime(book.updated_at).to_rfc3339(),
        },
        "chapters": chapters.iter().map(|c| json!({
            "id": c.id,
            "title": c.title,
            "content": c.content,
            "order_index": c.order_index,
        })).collect::<Vec<_>>(),
    });

    serde_json::to_vec_pretty(&value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize export: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookStatus, now_timestamp};

    fn sample_book() -> Book {
        Book {
            id: "book-1".to_string(),
            owner_id: "user-1".to_string(),
            title: "As Cronicas".to_string(),
            description: Some("Uma historia".to_string()),
            status: BookStatus::Draft,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn sample_chapter(id: &str, order: i64, content: &str) -> Chapter {
        Chapter {
            id: id.to_string(),
            book_id: "book-1".to_string(),
            author_id: "user-1".to_string(),
            title: format!("Capitulo {}", order + 1),
            content: Some(content.to_string()),
            order_index: order,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ExportFormat::parse("epub"), Some(ExportFormat::Epub));
        assert_eq!(ExportFormat::parse("EPUB"), None);
        assert_eq!(ExportFormat::parse("txt"), None);
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("As Cronicas de Gelo!"), "as-cronicas-de-gelo");
        assert_eq!(sanitize_title("   "), "book");
        assert_eq!(sanitize_title("A--B"), "a-b");
    }

    #[test]
    fn test_export_filename_has_date_and_extension() {
        let name = export_filename("My Book", ExportFormat::Pdf);
        assert!(name.starts_with("my-book-"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_json_dump_is_idempotent() {
        let book = sample_book();
        let chapters = vec![sample_chapter("c1", 0, "texto")];

        let a = generate_json(&book, "Autor", &chapters).unwrap();
        let b = generate_json(&book, "Autor", &chapters).unwrap();

        let va: serde_json::Value = serde_json::from_slice(&a).unwrap();
        let vb: serde_json::Value = serde_json::from_slice(&b).unwrap();
        assert_eq!(va["book"], vb["book"]);
        assert_eq!(va["chapters"], vb["chapters"]);
        assert_eq!(va["export"]["version"], "1.0");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a & b < c > d"), "a &amp; b &lt; c &gt; d");
    }
}
