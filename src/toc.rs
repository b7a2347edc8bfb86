//! Table of contents generation.
//!
//! The table of contents is always derived from current chapters and
//! elements; it is never written to the database. Page numbers are
//! estimates: a supporting element occupies a fixed number of pages and a
//! chapter's page count comes from its word count.

use crate::config::TocConfig;
use crate::db::{Book, BookElement, Chapter, Database};
use crate::error::Result;
use crate::events::{BookEventKind, EventBus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One entry in the generated table of contents.
#[derive(Debug, Clone, Serialize)]
pub struct TocItem {
    /// Chapter or element id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// "element" or "chapter".
    pub kind: &'static str,
    /// First page of the entry. Numbering starts at 1.
    pub start_page: i64,
    /// Estimated page count.
    pub page_count: i64,
}

/// Count words by splitting on Unicode whitespace.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated page count of a chapter: ceil(words / words_per_page), but
/// never less than one page, so an empty chapter still appears.
pub fn chapter_pages(content: Option<&str>, words_per_page: i64) -> i64 {
    let words = content.map(word_count).unwrap_or(0) as i64;
    std::cmp::max(1, (words as u64).div_ceil(words_per_page as u64) as i64)
}

/// Build the table of contents for a book. Enabled elements come first in
/// rank order, then chapters in rank order, with a running page counter.
pub fn build_toc(
    elements: &[BookElement],
    chapters: &[Chapter],
    config: &TocConfig,
) -> Vec<TocItem> {
    let mut items = Vec::with_capacity(elements.len() + chapters.len());
    let mut page = 1i64;
    let element_pages = config.element_pages as i64;

    for element in elements {
        items.push(TocItem {
            id: element.id.clone(),
            title: element.title.clone(),
            kind: "element",
            start_page: page,
            page_count: element_pages,
        });
        page += element_pages;
    }

    for chapter in chapters {
        let pages = chapter_pages(chapter.content.as_deref(), config.words_per_page as i64);
        items.push(TocItem {
            id: chapter.id.clone(),
            title: chapter.title.clone(),
            kind: "chapter",
            start_page: page,
            page_count: pages,
        });
        page += pages;
    }

    items
}

/// Computes and caches per-book tables of contents.
#[derive(Clone)]
pub struct TocService {
    db: Database,
    config: TocConfig,
    cache: Arc<Mutex<HashMap<String, Vec<TocItem>>>>,
}

impl TocService {
    /// Create a service over the given database.
    pub fn new(db: Database, config: TocConfig) -> Self {
        Self {
            db,
            config,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Compute the table of contents for a book, refreshing the cache.
    pub fn compute(&self, book: &Book) -> Result<Vec<TocItem>> {
        let elements = self.db.list_enabled_elements(&book.id)?;
        let chapters = self.db.list_chapters(&book.id)?;
        let items = build_toc(&elements, &chapters, &self.config);

        self.cache.lock().insert(book.id.clone(), items.clone());
        Ok(items)
    }

    /// Recompute the cache entry for a book by id, without an ownership
    /// check. Used by the background refresher, which only ever sees book
    /// ids published by authenticated mutations.
    fn refresh(&self, book_id: &str) -> Result<()> {
        let elements = self.db.list_enabled_elements(book_id)?;
        let chapters = self.db.list_chapters(book_id)?;
        let items = build_toc(&elements, &chapters, &self.config);

        self.cache.lock().insert(book_id.to_string(), items);
        Ok(())
    }

    /// Drop the cache entry for a deleted book.
    pub fn evict(&self, book_id: &str) {
        self.cache.lock().remove(book_id);
    }

    /// Run the debounced refresh loop. Change events for a book are
    /// coalesced over the configured debounce window before the table of
    /// contents is recomputed.
    pub async fn run_refresher(self, bus: EventBus) {
        let debounce = Duration::from_millis(self.config.refresh_debounce_ms);
        let mut rx = bus.subscribe();

        loop {
            let event = match rx.recv().await {
                Ok(e) => e,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("TOC refresher lagged, skipped {} events", skipped);
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            if event.kind == BookEventKind::ImagesChanged {
                continue;
            }

            // Coalesce further events for any book until the window closes.
            let mut pending = vec![event.book_id];
            let deadline = tokio::time::sleep(debounce);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    next = rx.recv() => match next {
                        Ok(e) if e.kind != BookEventKind::ImagesChanged => {
                            if !pending.contains(&e.book_id) {
                                pending.push(e.book_id);
                            }
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    },
                }
            }

            for book_id in pending {
                debug!("Refreshing TOC for book {}", book_id);
                if let Err(e) = self.refresh(&book_id) {
                    warn!("TOC refresh failed for book {}: {}", book_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ElementKind, now_timestamp};

    fn chapter(id: &str, title: &str, words: usize) -> Chapter {
        let content = if words == 0 {
            None
        } else {
            Some(vec!["word"; words].join(" "))
        };
        Chapter {
            id: id.to_string(),
            book_id: "b".to_string(),
            author_id: "u".to_string(),
            title: title.to_string(),
            content,
            order_index: 0,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn element(id: &str, kind: ElementKind) -> BookElement {
        BookElement {
            id: id.to_string(),
            book_id: "b".to_string(),
            kind,
            title: kind.default_title().to_string(),
            content: None,
            order_index: 0,
            enabled: true,
        }
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
        assert_eq!(word_count("uma palavra\tduas\n tres"), 4);
    }

    #[test]
    fn test_chapter_pages_boundaries() {
        // 0 words still occupies a page; 300 words exactly one page at the
        // default density; 301 spills to a second; 900 fills three.
        assert_eq!(chapter_pages(None, 300), 1);
        assert_eq!(chapter_pages(Some(""), 300), 1);
        assert_eq!(chapter_pages(Some(&vec!["w"; 300].join(" ")), 300), 1);
        assert_eq!(chapter_pages(Some(&vec!["w"; 301].join(" ")), 300), 2);
        assert_eq!(chapter_pages(Some(&vec!["w"; 900].join(" ")), 300), 3);
    }

    #[test]
    fn test_elements_precede_chapters_with_running_counter() {
        let config = TocConfig::default();
        let elements = vec![
            element("e1", ElementKind::Dedication),
            element("e2", ElementKind::Preface),
        ];
        let chapters = vec![
            chapter("c1", "One", 0),
            chapter("c2", "Two", 600),
            chapter("c3", "Three", 900),
        ];

        let toc = build_toc(&elements, &chapters, &config);
        assert_eq!(toc.len(), 5);

        assert_eq!(toc[0].start_page, 1);
        assert_eq!(toc[0].page_count, 2);
        assert_eq!(toc[1].start_page, 3);
        assert_eq!(toc[2].kind, "chapter");
        assert_eq!(toc[2].start_page, 5);
        assert_eq!(toc[2].page_count, 1);
        assert_eq!(toc[3].start_page, 6);
        assert_eq!(toc[3].page_count, 2);
        assert_eq!(toc[4].start_page, 8);
        assert_eq!(toc[4].page_count, 3);
    }

    #[test]
    fn test_empty_book_yields_empty_toc() {
        let toc = build_toc(&[], &[], &TocConfig::default());
        assert!(toc.is_empty());
    }
}
