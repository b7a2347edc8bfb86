//! Minimal DOCX export.
//!
//! The archive contains exactly the four parts Word needs to open a file:
//! `[Content_Types].xml`, the package relationships, the document
//! relationships and `word/document.xml`. No styles, numbering or theme
//! parts. The document body is one run for the title, one for the author
//! line and one run per non-empty newline-split paragraph.

use crate::db::{Book, Chapter};
use crate::error::Result;
use crate::export::xml_escape;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>
"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>
"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
</Relationships>
"#;

fn paragraph(text: &str, bold: bool) -> String {
    let props = if bold {
        "<w:rPr><w:b/></w:rPr>"
    } else {
        ""
    };
    format!(
        "<w:p><w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        props,
        xml_escape(text)
    )
}

/// Build `word/document.xml`.
fn generate_document_xml(book: &Book, owner_name: &str, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
    out.push_str(
        "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">",
    );
    out.push_str("<w:body>");

    // The two header runs.
    out.push_str(&paragraph(&book.title, true));
    out.push_str(&paragraph(&format!("por {}", owner_name), false));

    for chapter in chapters {
        if let Some(ref content) = chapter.content {
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&paragraph(line, false));
            }
        }
    }

    out.push_str("</w:body></w:document>");
    out
}

/// Generate the DOCX bytes for a book.
pub fn generate_docx(book: &Book, owner_name: &str, chapters: &[Chapter]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;

    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(DOCUMENT_RELS_XML.as_bytes())?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(generate_document_xml(book, owner_name, chapters).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookStatus, now_timestamp};
    use std::io::Read;
    use zip::ZipArchive;

    fn book() -> Book {
        Book {
            id: "b".to_string(),
            owner_id: "u".to_string(),
            title: "Contos".to_string(),
            description: None,
            status: BookStatus::Draft,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn chapter(content: &str) -> Chapter {
        Chapter {
            id: "c".to_string(),
            book_id: "b".to_string(),
            author_id: "u".to_string(),
            title: "Capitulo".to_string(),
            content: Some(content.to_string()),
            order_index: 0,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn document_xml(bytes: Vec<u8>) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("word/document.xml").unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_archive_has_the_four_parts() {
        let bytes = generate_docx(&book(), "Autor", &[chapter("texto")]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/_rels/document.xml.rels",
            "word/document.xml",
        ] {
            assert!(archive.by_name(name).is_ok(), "missing {}", name);
        }
    }

    #[test]
    fn test_one_run_per_nonempty_paragraph_plus_headers() {
        let chapters = vec![chapter("um\n\ndois"), chapter("tres\n   \nquatro\ncinco")];
        let xml = document_xml(generate_docx(&book(), "Autor", &chapters).unwrap());

        // 2 header runs + 5 content paragraphs
        assert_eq!(xml.matches("<w:t").count(), 7);
        assert!(xml.contains(">Contos</w:t>"));
        assert!(xml.contains(">por Autor</w:t>"));
    }

    #[test]
    fn test_special_characters_escaped() {
        let xml = document_xml(generate_docx(&book(), "A & B", &[chapter("1 < 2 > 0 & fim")]).unwrap());
        assert!(xml.contains("por A &amp; B"));
        assert!(xml.contains("1 &lt; 2 &gt; 0 &amp; fim"));
        assert!(!xml.contains("1 < 2"));
    }

    #[test]
    fn test_document_xml_is_well_formed() {
        let xml = document_xml(generate_docx(&book(), "Autor", &[chapter("um\ndois")]).unwrap());
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let runs = doc
            .descendants()
            .filter(|n| n.has_tag_name("t"))
            .count();
        assert_eq!(runs, 4);
    }
}
