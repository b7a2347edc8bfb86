//! Single-document HTML export.

use crate::db::{Book, Chapter};
use crate::export::xml_escape;

const STYLE: &str = r#"
body { font-family: Georgia, serif; max-width: 42em; margin: 0 auto; padding: 2em; line-height: 1.6; }
h1 { text-align: center; }
.author { text-align: center; font-style: italic; margin-bottom: 3em; }
.chapter { page-break-before: always; }
.chapter h2 { margin-top: 2em; }
"#;

/// Render the book as one HTML document with inline CSS. Each chapter div
/// carries page-break-before so a downstream print/convert step starts it
/// on a fresh page.
pub fn generate_html(book: &Book, owner_name: &str, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", xml_escape(&book.title)));
    out.push_str(&format!("<style>{}</style>\n", STYLE));
    out.push_str("</head>\n<body>\n");

    out.push_str(&format!("<h1>{}</h1>\n", xml_escape(&book.title)));
    out.push_str(&format!(
        "<p class=\"author\">por {}</p>\n",
        xml_escape(owner_name)
    ));

    if let Some(ref description) = book.description {
        out.push_str(&format!(
            "<p class=\"description\">{}</p>\n",
            xml_escape(description)
        ));
    }

    for chapter in chapters {
        out.push_str("<div class=\"chapter\">\n");
        out.push_str(&format!("<h2>{}</h2>\n", xml_escape(&chapter.title)));
        if let Some(ref content) = chapter.content {
            for paragraph in content.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&format!("<p>{}</p>\n", xml_escape(paragraph)));
            }
        }
        out.push_str("</div>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookStatus, now_timestamp};

    fn book() -> Book {
        Book {
            id: "b".to_string(),
            owner_id: "u".to_string(),
            title: "Titulo & Cia".to_string(),
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
    fn test_chapters_get_page_breaks() {
        let html = generate_html(
            &book(),
            "Autor",
            &[chapter("Um", "texto"), chapter("Dois", "mais texto")],
        );
        assert_eq!(html.matches("class=\"chapter\"").count(), 2);
        assert!(html.contains("page-break-before: always"));
    }

    #[test]
    fn test_special_characters_escaped() {
        let html = generate_html(&book(), "A & B", &[chapter("C<h>", "1 < 2 & 3 > 0")]);
        assert!(html.contains("Titulo &amp; Cia"));
        assert!(html.contains("por A &amp; B"));
        assert!(html.contains("C&lt;h&gt;"));
        assert!(html.contains("1 &lt; 2 &amp; 3 &gt; 0"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let html = generate_html(&book(), "A", &[chapter("C", "um\n\n  \ndois")]);
        assert_eq!(html.matches("<p>").count(), 2);
    }
}
