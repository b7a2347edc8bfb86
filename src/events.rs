//! In-process change notifications.
//!
//! Mutations to a book's content publish a typed event on a broadcast
//! channel. Subscribers (the table-of-contents refresher, future live
//! collaborators) receive every event; a lagging subscriber misses old
//! events rather than blocking publishers.

use serde::Serialize;
use tokio::sync::broadcast;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookEventKind {
    /// A chapter was created, updated, deleted or reordered.
    ChaptersChanged,
    /// A supporting element was created, updated or deleted.
    ElementsChanged,
    /// An image was uploaded, moved, restyled or deleted.
    ImagesChanged,
    /// The book row itself changed (title, status, cover).
    BookChanged,
}

/// A change notification scoped to one book.
#[derive(Debug, Clone, Serialize)]
pub struct BookEvent {
    /// The affected book.
    pub book_id: String,
    /// What changed.
    pub kind: BookEventKind,
}

/// Broadcast hub for book events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BookEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. A bus with no subscribers drops it silently.
    pub fn publish(&self, book_id: &str, kind: BookEventKind) {
        let _ = self.sender.send(BookEvent {
            book_id: book_id.to_string(),
            kind,
        });
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish("book-1", BookEventKind::ChaptersChanged);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.book_id, "book-1");
        assert_eq!(event.kind, BookEventKind::ChaptersChanged);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish("book-1", BookEventKind::BookChanged);
    }
}
