//! EPUB 3 export.
//!
//! Archive layout: the `mimetype` entry first and stored uncompressed,
//! then `META-INF/container.xml`, the OPF package document, a navigation
//! XHTML document, an NCX document for EPUB 2 readers, and one XHTML file
//! per chapter.

use crate::db::{Book, Chapter};
use crate::error::Result;
use crate::export::xml_escape;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn chapter_filename(index: usize) -> String {
    format!("chapter-{}.xhtml", index + 1)
}

/// Generate the EPUB bytes for a book.
pub fn generate_epub(book: &Book, owner_name: &str, chapters: &[Chapter]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // mimetype must be the first entry and uncompressed.
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    let identifier = format!("urn:uuid:{}", book.id);

    zip.start_file("OEBPS/content.opf", options_deflate)?;
    zip.write_all(generate_opf(book, owner_name, chapters, &identifier).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", options_deflate)?;
    zip.write_all(generate_nav(book, chapters).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", options_deflate)?;
    zip.write_all(generate_ncx(book, chapters, &identifier).as_bytes())?;

    for (index, chapter) in chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/{}", chapter_filename(index)), options_deflate)?;
        zip.write_all(generate_chapter_xhtml(chapter).as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Write a simple text element.
fn write_text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    let _ = writer.write_event(Event::Text(BytesText::new(text)));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

/// Build the OPF package document. The manifest lists the navigation
/// document, the NCX and one item per chapter; the spine references the
/// chapters in order.
fn generate_opf(book: &Book, owner_name: &str, chapters: &[Chapter], identifier: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut package = BytesStart::new("package");
    package.push_attribute(("xmlns", "http://www.idpf.org/2007/opf"));
    package.push_attribute(("version", "3.0"));
    package.push_attribute(("unique-identifier", "book-id"));
    let _ = writer.write_event(Event::Start(package));

    // Metadata
    let mut metadata = BytesStart::new("metadata");
    metadata.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    let _ = writer.write_event(Event::Start(metadata));

    let mut id_elem = BytesStart::new("dc:identifier");
    id_elem.push_attribute(("id", "book-id"));
    let _ = writer.write_event(Event::Start(id_elem));
    let _ = writer.write_event(Event::Text(BytesText::new(identifier)));
    let _ = writer.write_event(Event::End(BytesEnd::new("dc:identifier")));

    write_text_element(&mut writer, "dc:title", &book.title);
    write_text_element(&mut writer, "dc:creator", owner_name);
    write_text_element(&mut writer, "dc:language", "pt-BR");

    let mut modified = BytesStart::new("meta");
    modified.push_attribute(("property", "dcterms:modified"));
    let _ = writer.write_event(Event::Start(modified));
    let _ = writer.write_event(Event::Text(BytesText::new(
        &chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    )));
    let _ = writer.write_event(Event::End(BytesEnd::new("meta")));

    let _ = writer.write_event(Event::End(BytesEnd::new("metadata")));

    // Manifest
    let _ = writer.write_event(Event::Start(BytesStart::new("manifest")));

    let mut nav_item = BytesStart::new("item");
    nav_item.push_attribute(("id", "nav"));
    nav_item.push_attribute(("href", "nav.xhtml"));
    nav_item.push_attribute(("media-type", "application/xhtml+xml"));
    nav_item.push_attribute(("properties", "nav"));
    let _ = writer.write_event(Event::Empty(nav_item));

    let mut ncx_item = BytesStart::new("item");
    ncx_item.push_attribute(("id", "ncx"));
    ncx_item.push_attribute(("href", "toc.ncx"));
    ncx_item.push_attribute(("media-type", "application/x-dtbncx+xml"));
    let _ = writer.write_event(Event::Empty(ncx_item));

    for (index, _) in chapters.iter().enumerate() {
        let mut item = BytesStart::new("item");
        item.push_attribute(("id", format!("chapter-{}", index + 1).as_str()));
        item.push_attribute(("href", chapter_filename(index).as_str()));
        item.push_attribute(("media-type", "application/xhtml+xml"));
        let _ = writer.write_event(Event::Empty(item));
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("manifest")));

    // Spine
    let mut spine = BytesStart::new("spine");
    spine.push_attribute(("toc", "ncx"));
    let _ = writer.write_event(Event::Start(spine));

    for (index, _) in chapters.iter().enumerate() {
        let mut itemref = BytesStart::new("itemref");
        itemref.push_attribute(("idref", format!("chapter-{}", index + 1).as_str()));
        let _ = writer.write_event(Event::Empty(itemref));
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("spine")));
    let _ = writer.write_event(Event::End(BytesEnd::new("package")));

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

/// Build the EPUB 3 navigation document.
fn generate_nav(book: &Book, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n");
    out.push_str(&format!(
        "<head><title>{}</title></head>\n<body>\n",
        xml_escape(&book.title)
    ));
    out.push_str("<nav epub:type=\"toc\">\n<ol>\n");
    for (index, chapter) in chapters.iter().enumerate() {
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            chapter_filename(index),
            xml_escape(&chapter.title)
        ));
    }
    out.push_str("</ol>\n</nav>\n</body>\n</html>\n");
    out
}

/// Build the NCX document for EPUB 2 readers.
fn generate_ncx(book: &Book, chapters: &[Chapter], identifier: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut ncx = BytesStart::new("ncx");
    ncx.push_attribute(("xmlns", "http://www.daisy.org/z3986/2005/ncx/"));
    ncx.push_attribute(("version", "2005-1"));
    let _ = writer.write_event(Event::Start(ncx));

    let _ = writer.write_event(Event::Start(BytesStart::new("head")));
    let mut uid = BytesStart::new("meta");
    uid.push_attribute(("name", "dtb:uid"));
    uid.push_attribute(("content", identifier));
    let _ = writer.write_event(Event::Empty(uid));
    let _ = writer.write_event(Event::End(BytesEnd::new("head")));

    let _ = writer.write_event(Event::Start(BytesStart::new("docTitle")));
    write_text_element(&mut writer, "text", &book.title);
    let _ = writer.write_event(Event::End(BytesEnd::new("docTitle")));

    let _ = writer.write_event(Event::Start(BytesStart::new("navMap")));
    for (index, chapter) in chapters.iter().enumerate() {
        let mut nav_point = BytesStart::new("navPoint");
        nav_point.push_attribute(("id", format!("navpoint-{}", index + 1).as_str()));
        nav_point.push_attribute(("playOrder", (index + 1).to_string().as_str()));
        let _ = writer.write_event(Event::Start(nav_point));

        let _ = writer.write_event(Event::Start(BytesStart::new("navLabel")));
        write_text_element(&mut writer, "text", &chapter.title);
        let _ = writer.write_event(Event::End(BytesEnd::new("navLabel")));

        let mut content = BytesStart::new("content");
        content.push_attribute(("src", chapter_filename(index).as_str()));
        let _ = writer.write_event(Event::Empty(content));

        let _ = writer.write_event(Event::End(BytesEnd::new("navPoint")));
    }
    let _ = writer.write_event(Event::End(BytesEnd::new("navMap")));
    let _ = writer.write_event(Event::End(BytesEnd::new("ncx")));

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

/// Build one chapter XHTML file, splitting paragraphs on newline.
fn generate_chapter_xhtml(chapter: &Chapter) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\">\n");
    out.push_str(&format!(
        "<head><title>{}</title></head>\n<body>\n",
        xml_escape(&chapter.title)
    ));
    out.push_str(&format!("<h2>{}</h2>\n", xml_escape(&chapter.title)));
    if let Some(ref content) = chapter.content {
        for paragraph in content.lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("<p>{}</p>\n", xml_escape(paragraph)));
        }
    }
    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookStatus, now_timestamp};
    use std::io::Read;
    use zip::ZipArchive;

    fn book() -> Book {
        Book {
            id: "7a0e1f1e-0000-4000-8000-000000000001".to_string(),
            owner_id: "u".to_string(),
            title: "Meu Livro".to_string(),
            description: None,
            status: BookStatus::Draft,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn chapter(order: i64, title: &str) -> Chapter {
        Chapter {
            id: format!("c{}", order),
            book_id: "b".to_string(),
            author_id: "u".to_string(),
            title: title.to_string(),
            content: Some("primeiro paragrafo\n\nsegundo paragrafo".to_string()),
            order_index: order,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut entry = archive.by_name(name).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_mimetype_first_and_stored() {
        let bytes = generate_epub(&book(), "Autor", &[chapter(0, "Um")]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        drop(first);

        assert_eq!(read_entry(&mut archive, "mimetype"), "application/epub+zip");
    }

    #[test]
    fn test_structure_for_n_chapters() {
        let chapters = vec![chapter(0, "Um"), chapter(1, "Dois"), chapter(2, "Tres")];
        let bytes = generate_epub(&book(), "Autor", &chapters).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        // mimetype + container + opf + nav + ncx + 3 chapters
        assert_eq!(archive.len(), 8);

        let opf = read_entry(&mut archive, "OEBPS/content.opf");
        let doc = roxmltree::Document::parse(&opf).unwrap();

        let items: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("item"))
            .collect();
        assert_eq!(items.len(), 5); // nav + ncx + 3 chapters

        let itemrefs: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("itemref"))
            .collect();
        assert_eq!(itemrefs.len(), 3);
        assert_eq!(itemrefs[0].attribute("idref"), Some("chapter-1"));
        assert_eq!(itemrefs[2].attribute("idref"), Some("chapter-3"));
    }

    #[test]
    fn test_chapter_xhtml_paragraphs() {
        let bytes = generate_epub(&book(), "Autor", &[chapter(0, "Um & Dois")]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let xhtml = read_entry(&mut archive, "OEBPS/chapter-1.xhtml");
        assert!(xhtml.contains("<h2>Um &amp; Dois</h2>"));
        assert_eq!(xhtml.matches("<p>").count(), 2);
    }

    #[test]
    fn test_ncx_navpoints_follow_chapter_order() {
        let bytes =
            generate_epub(&book(), "Autor", &[chapter(0, "Um"), chapter(1, "Dois")]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let ncx = read_entry(&mut archive, "OEBPS/toc.ncx");
        let doc = roxmltree::Document::parse(&ncx).unwrap();
        let labels: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("text"))
            .filter_map(|n| n.text())
            .collect();
        assert_eq!(labels, vec!["Meu Livro", "Um", "Dois"]);
    }

    #[test]
    fn test_empty_book_still_valid_archive() {
        let bytes = generate_epub(&book(), "Autor", &[]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 5);

        let nav = read_entry(&mut archive, "OEBPS/nav.xhtml");
        assert!(nav.contains("<ol>"));
    }
}
