//! Real PDF export.
//!
//! Builds an actual PDF document with lopdf: a title page followed by the
//! chapters, flowing text onto new pages as needed. Text is set in the
//! built-in Helvetica fonts, so rendering needs no embedded font program.

use crate::db::{Book, Chapter};
use crate::error::{AppError, Result};
use lopdf::{Document, Object, Stream, dictionary};

// US Letter in points.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;

const BODY_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 18.0;
const TITLE_SIZE: f32 = 28.0;
const LEADING: f32 = 16.0;

/// Rough character budget per line at the body size. Helvetica averages
/// about half the point size per glyph.
const LINE_CHARS: usize = 85;

/// Escape a string for a PDF literal string inside a content stream.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if c.is_control() => out.push(' '),
            c if (c as u32) < 256 => out.push(c),
            // Outside Latin-1; the built-in font cannot show it anyway.
            _ => out.push('?'),
        }
    }
    out
}

/// Greedy word wrap against the character budget.
fn wrap_line(line: &str, max_chars: usize) -> Vec<String> {
    let mut wrapped = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            wrapped.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

/// One positioned line of output.
struct Line {
    text: String,
    size: f32,
    bold: bool,
    /// Extra leading above this line.
    space_before: f32,
}

/// Accumulates lines into per-page content streams.
struct PageBuilder {
    pages: Vec<String>,
    current: String,
    y: f32,
}

impl PageBuilder {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn break_page(&mut self) {
        if !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn push(&mut self, line: &Line) {
        let advance = line.space_before + LEADING.max(line.size * 1.25);
        if self.y - advance < MARGIN && !self.current.is_empty() {
            self.break_page();
        }
        self.y -= advance;

        let font = if line.bold { "F2" } else { "F1" };
        self.current.push_str(&format!(
            "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
            font,
            line.size,
            MARGIN,
            self.y,
            escape_pdf_text(&line.text)
        ));
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.pages.push(self.current);
        }
        if self.pages.is_empty() {
            self.pages.push(String::new());
        }
        self.pages
    }
}

/// Generate the PDF bytes for a book.
pub fn generate_pdf(book: &Book, owner_name: &str, chapters: &[Chapter]) -> Result<Vec<u8>> {
    let mut builder = PageBuilder::new();

    // Title page.
    builder.push(&Line {
        text: book.title.clone(),
        size: TITLE_SIZE,
        bold: true,
        space_before: PAGE_HEIGHT / 4.0,
    });
    builder.push(&Line {
        text: format!("por {}", owner_name),
        size: BODY_SIZE + 2.0,
        bold: false,
        space_before: 12.0,
    });
    if let Some(ref description) = book.description {
        for wrapped in wrap_line(description, LINE_CHARS) {
            builder.push(&Line {
                text: wrapped,
                size: BODY_SIZE,
                bold: false,
                space_before: 4.0,
            });
        }
    }

    // Each chapter starts on a fresh page.
    for chapter in chapters {
        builder.break_page();
        builder.push(&Line {
            text: chapter.title.clone(),
            size: HEADING_SIZE,
            bold: true,
            space_before: 0.0,
        });

        if let Some(ref content) = chapter.content {
            for paragraph in content.lines() {
                if paragraph.trim().is_empty() {
                    continue;
                }
                let mut first = true;
                for wrapped in wrap_line(paragraph, LINE_CHARS) {
                    builder.push(&Line {
                        text: wrapped,
                        size: BODY_SIZE,
                        bold: false,
                        space_before: if first { 8.0 } else { 0.0 },
                    });
                    first = false;
                }
            }
        }
    }

    build_document(book, owner_name, builder.finish())
}

/// Content streams address WinAnsi glyphs by single bytes; the escape
/// step already clamped every char below 256.
fn latin1_bytes(content: &str) -> Vec<u8> {
    content.chars().map(|c| c as u8).collect()
}

/// Assemble the page tree from the per-page content streams.
fn build_document(book: &Book, owner_name: &str, contents: Vec<String>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(book.title.clone()),
        "Author" => Object::string_literal(owner_name.to_string()),
        "Creator" => Object::string_literal("bookforge".to_string()),
        "Producer" => Object::string_literal("bookforge-rs".to_string()),
    });
    doc.trailer.set("Info", Object::Reference(info_id));

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => Object::Reference(font_id),
            "F2" => Object::Reference(bold_font_id),
        },
    });

    let mut page_ids = Vec::with_capacity(contents.len());
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, latin1_bytes(&content)));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        });
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    let count = page_ids.len() as i64;
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
    });

    for page_id in &page_ids {
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut pdf_bytes = Vec::new();
    doc.save_to(&mut pdf_bytes)
        .map_err(|e| AppError::Pdf(format!("Failed to save PDF: {}", e)))?;

    Ok(pdf_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookStatus, now_timestamp};

    fn book() -> Book {
        Book {
            id: "b".to_string(),
            owner_id: "u".to_string(),
            title: "Livro de Teste".to_string(),
            description: None,
            status: BookStatus::Draft,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn chapter(title: &str, content: &str) -> Chapter {
        Chapter {
            id: "c".to_string(),
            book_id: "b".to_string(),
            author_id: "u".to_string(),
            title: title.to_string(),
            content: Some(content.to_string()),
            order_index: 0,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    #[test]
    fn test_output_is_a_parseable_pdf() {
        let bytes = generate_pdf(&book(), "Autor", &[chapter("Um", "conteudo")]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        // Title page plus one chapter page.
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_each_chapter_starts_a_page() {
        let bytes = generate_pdf(
            &book(),
            "Autor",
            &[chapter("Um", "a"), chapter("Dois", "b"), chapter("Tres", "c")],
        )
        .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }

    #[test]
    fn test_long_chapter_overflows_to_more_pages() {
        let long = vec!["palavra"; 4000].join(" ");
        let bytes = generate_pdf(&book(), "Autor", &[chapter("Longo", &long)]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 2);
    }

    #[test]
    fn test_escape_pdf_text() {
        assert_eq!(escape_pdf_text("a(b)c\\d"), "a\\(b\\)c\\\\d");
        assert_eq!(escape_pdf_text("caf\u{e9}"), "caf\u{e9}");
        assert_eq!(escape_pdf_text("\u{1f600}"), "?");
    }

    #[test]
    fn test_wrap_line() {
        let wrapped = wrap_line("um dois tres quatro", 8);
        assert_eq!(wrapped, vec!["um dois", "tres", "quatro"]);
        assert!(wrap_line("", 8).is_empty());
    }
}
