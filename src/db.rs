mod schema;

pub use schema::Database;

use crate::layout::{ImageLayout, TextWrap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account with profile fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login.
    pub username: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name.
    pub display_name: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Short biography.
    pub bio: Option<String>,
    /// Storage path of the avatar image.
    pub avatar_path: Option<String>,
    /// User role: "admin" or "user".
    pub role: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Name shown in exports and listings.
    pub fn author_name(&self) -> String {
        if let Some(ref name) = self.display_name {
            return name.clone();
        }
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.username.clone(),
        }
    }
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Device ID (optional).
    pub device_id: Option<String>,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    /// Being written; the default.
    Draft,
    /// Published to readers.
    Published,
    /// Archived, hidden from the active list.
    Archived,
}

impl BookStatus {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Draft => "draft",
            BookStatus::Published => "published",
            BookStatus::Archived => "archived",
        }
    }

    /// Parse from database text, defaulting to draft.
    pub fn parse(s: &str) -> Self {
        match s {
            "published" => BookStatus::Published,
            "archived" => BookStatus::Archived,
            _ => BookStatus::Draft,
        }
    }
}

/// A book owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique book ID.
    pub id: String,
    /// Owning user ID.
    pub owner_id: String,
    /// Book title.
    pub title: String,
    /// Description or back-cover text.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: BookStatus,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// A chapter of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Unique chapter ID.
    pub id: String,
    /// Owning book ID.
    pub book_id: String,
    /// Author user ID.
    pub author_id: String,
    /// Chapter title.
    pub title: String,
    /// Chapter text content.
    pub content: Option<String>,
    /// Rank used for display order and pagination. Dense-ish, not
    /// guaranteed contiguous.
    pub order_index: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// The nine supporting element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Cover page.
    Cover,
    /// Dedication.
    Dedication,
    /// Acknowledgments.
    Acknowledgments,
    /// Preface.
    Preface,
    /// Epigraph.
    Epigraph,
    /// Introduction.
    Introduction,
    /// Conclusion.
    Conclusion,
    /// Bibliography.
    Bibliography,
    /// Glossary.
    Glossary,
}

impl ElementKind {
    /// All kinds in the order they sort before chapters by default.
    pub const ALL: [ElementKind; 9] = [
        ElementKind::Cover,
        ElementKind::Dedication,
        ElementKind::Acknowledgments,
        ElementKind::Preface,
        ElementKind::Epigraph,
        ElementKind::Introduction,
        ElementKind::Conclusion,
        ElementKind::Bibliography,
        ElementKind::Glossary,
    ];

    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Cover => "cover",
            ElementKind::Dedication => "dedication",
            ElementKind::Acknowledgments => "acknowledgments",
            ElementKind::Preface => "preface",
            ElementKind::Epigraph => "epigraph",
            ElementKind::Introduction => "introduction",
            ElementKind::Conclusion => "conclusion",
            ElementKind::Bibliography => "bibliography",
            ElementKind::Glossary => "glossary",
        }
    }

    /// Parse from database text.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Human-readable title for new elements.
    pub fn default_title(&self) -> &'static str {
        match self {
            ElementKind::Cover => "Cover",
            ElementKind::Dedication => "Dedication",
            ElementKind::Acknowledgments => "Acknowledgments",
            ElementKind::Preface => "Preface",
            ElementKind::Epigraph => "Epigraph",
            ElementKind::Introduction => "Introduction",
            ElementKind::Conclusion => "Conclusion",
            ElementKind::Bibliography => "Bibliography",
            ElementKind::Glossary => "Glossary",
        }
    }
}

/// A supporting (non-chapter) book part with enable/disable and ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookElement {
    /// Unique element ID.
    pub id: String,
    /// Owning book ID.
    pub book_id: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Element title.
    pub title: String,
    /// Element text content.
    pub content: Option<String>,
    /// Rank among elements of the same book.
    pub order_index: i64,
    /// Whether the element appears in the book and its TOC.
    pub enabled: bool,
}

/// An uploaded image with layout properties.
///
/// A null chapter with a set book means "book-level" (e.g. cover art).
/// Layout columns are nullable in the database; missing values read back
/// as the defaults (0 offsets, scale 1, z-index 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Unique image ID.
    pub id: String,
    /// Owning user ID.
    pub owner_id: String,
    /// Book the image belongs to, if any.
    pub book_id: Option<String>,
    /// Chapter the image is placed in, if any.
    pub chapter_id: Option<String>,
    /// Path within the upload storage root.
    pub storage_path: String,
    /// Alternative text.
    pub alt_text: Option<String>,
    /// File size in bytes.
    pub file_size: Option<i64>,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Horizontal pixel offset from the anchored position.
    pub position_x: f64,
    /// Vertical pixel offset from the anchored position.
    pub position_y: f64,
    /// Scale multiplier.
    pub scale: f64,
    /// Stacking order; the only disambiguator between overlapping images.
    pub z_index: i64,
    /// Layout keyword.
    pub layout: ImageLayout,
    /// Text wrap keyword.
    pub text_wrap: TextWrap,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Cover association between a book and an image.
///
/// At most one row per book; setting a new cover deletes the old row
/// first, no history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCover {
    /// Book ID.
    pub book_id: String,
    /// Image ID.
    pub image_id: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Audit row for every heuristic invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSession {
    /// Unique row ID.
    pub id: String,
    /// Invoking user ID.
    pub user_id: String,
    /// Book context, if any.
    pub book_id: Option<String>,
    /// Chapter context, if any.
    pub chapter_id: Option<String>,
    /// Provider tag; always "local".
    pub provider: String,
    /// Heuristic kind (enrich goal or "prompt").
    pub kind: String,
    /// Excerpt of the input text.
    pub prompt_excerpt: String,
    /// Produced output.
    pub output: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Activity log entry (currently written by exports).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Unique row ID.
    pub id: String,
    /// Acting user ID.
    pub user_id: String,
    /// Book the action concerned.
    pub book_id: Option<String>,
    /// Action name, e.g. "export".
    pub action: String,
    /// Free-form detail, e.g. the export format.
    pub detail: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
