use crate::db::*;
use crate::error::{AppError, Result};
use crate::layout::{ImageLayout, LayoutProps, TextWrap};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table (account + profile)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT,
                first_name TEXT,
                last_name TEXT,
                bio TEXT,
                avatar_path TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                device_id TEXT,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Chapters table
            CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                order_index INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Supporting elements table
            CREATE TABLE IF NOT EXISTS book_elements (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                order_index INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Images table (layout columns nullable; missing values read
            -- back as defaults)
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                book_id TEXT,
                chapter_id TEXT,
                storage_path TEXT NOT NULL,
                alt_text TEXT,
                file_size INTEGER,
                mime_type TEXT,
                position_x REAL,
                position_y REAL,
                scale REAL,
                z_index INTEGER,
                layout TEXT,
                text_wrap TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE
            );

            -- Book covers table (at most one row per book)
            CREATE TABLE IF NOT EXISTS book_covers (
                book_id TEXT PRIMARY KEY,
                image_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
            );

            -- Heuristic invocation audit table
            CREATE TABLE IF NOT EXISTS ai_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT,
                chapter_id TEXT,
                provider TEXT NOT NULL DEFAULT 'local',
                kind TEXT NOT NULL,
                prompt_excerpt TEXT NOT NULL,
                output TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Activity log table
            CREATE TABLE IF NOT EXISTS activity_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT,
                action TEXT NOT NULL,
                detail TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_owner ON books(owner_id);
            CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id, order_index);
            CREATE INDEX IF NOT EXISTS idx_elements_book ON book_elements(book_id, order_index);
            CREATE INDEX IF NOT EXISTS idx_images_book ON images(book_id);
            CREATE INDEX IF NOT EXISTS idx_images_chapter ON images(chapter_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            CREATE INDEX IF NOT EXISTS idx_ai_sessions_user ON ai_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_log(user_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, password_hash, display_name, first_name, last_name,
                                bio, avatar_path, role, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.display_name,
                user.first_name,
                user.last_name,
                user.bio,
                user.avatar_path,
                user.role,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation(format!("Username '{}' already exists", user.username))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            display_name: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            bio: row.get(6)?,
            avatar_path: row.get(7)?,
            role: row.get(8)?,
            created_at: row.get(9)?,
            last_login: row.get(10)?,
        })
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, password_hash, display_name, first_name, last_name,
                    bio, avatar_path, role, created_at, last_login
             FROM users WHERE username = ?1",
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, password_hash, display_name, first_name, last_name,
                    bio, avatar_path, role, created_at, last_login
             FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, username, password_hash, display_name, first_name, last_name,
                        bio, avatar_path, role, created_at, last_login
                 FROM users ORDER BY username",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user profile fields.
    pub fn update_user_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
        avatar_path: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET display_name = ?1, first_name = ?2, last_name = ?3,
                                  bio = ?4, avatar_path = ?5
                 WHERE id = ?6",
                params![display_name, first_name, last_name, bio, avatar_path, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update profile: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, device_id, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.user_id,
                session.device_id,
                session.expires_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, device_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    device_id: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        let status: String = row.get(4)?;
        Ok(Book {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: BookStatus::parse(&status),
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Create a book.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (id, owner_id, title, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                book.id,
                book.owner_id,
                book.title,
                book.description,
                book.status.as_str(),
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;
        Ok(())
    }

    /// Get a book visible to the given owner. An existing book owned by
    /// someone else reads as absent.
    pub fn get_book(&self, id: &str, owner_id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, owner_id, title, description, status, created_at, updated_at
             FROM books WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List books owned by a user, most recently updated first.
    pub fn list_books(&self, owner_id: &str) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, owner_id, title, description, status, created_at, updated_at
                 FROM books WHERE owner_id = ?1 ORDER BY updated_at DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params![owner_id], Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Update book title, description and status.
    pub fn update_book(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        description: Option<&str>,
        status: BookStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET title = ?1, description = ?2, status = ?3, updated_at = ?4
                 WHERE id = ?5 AND owner_id = ?6",
                params![
                    title,
                    description,
                    status.as_str(),
                    now_timestamp(),
                    id,
                    owner_id
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Bump a book's updated_at.
    pub fn touch_book(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE books SET updated_at = ?1 WHERE id = ?2",
            params![now_timestamp(), id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to touch book: {}", e)))?;
        Ok(())
    }

    /// Delete a book. Chapters, elements, images and the cover row cascade.
    pub fn delete_book(&self, id: &str, owner_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM books WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== CHAPTER OPERATIONS ==========

    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            id: row.get(0)?,
            book_id: row.get(1)?,
            author_id: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            order_index: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Create a chapter.
    pub fn create_chapter(&self, chapter: &Chapter) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chapters (id, book_id, author_id, title, content, order_index,
                                   created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                chapter.id,
                chapter.book_id,
                chapter.author_id,
                chapter.title,
                chapter.content,
                chapter.order_index,
                chapter.created_at,
                chapter.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create chapter: {}", e)))?;
        Ok(())
    }

    /// Get a chapter, scoped through book ownership.
    pub fn get_chapter(&self, id: &str, owner_id: &str) -> Result<Option<Chapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT c.id, c.book_id, c.author_id, c.title, c.content, c.order_index,
                    c.created_at, c.updated_at
             FROM chapters c JOIN books b ON c.book_id = b.id
             WHERE c.id = ?1 AND b.owner_id = ?2",
            params![id, owner_id],
            Self::row_to_chapter,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get chapter: {}", e)))
    }

    /// List chapters of a book ordered by order_index.
    pub fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, author_id, title, content, order_index,
                        created_at, updated_at
                 FROM chapters WHERE book_id = ?1 ORDER BY order_index, created_at",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![book_id], Self::row_to_chapter)
            .map_err(|e| AppError::Internal(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// List chapters with order_index in an inclusive range.
    pub fn list_chapters_in_range(
        &self,
        book_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Chapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, author_id, title, content, order_index,
                        created_at, updated_at
                 FROM chapters
                 WHERE book_id = ?1 AND order_index >= ?2 AND order_index <= ?3
                 ORDER BY order_index, created_at",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![book_id, from, to], Self::row_to_chapter)
            .map_err(|e| AppError::Internal(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// Next free order_index for a new chapter.
    pub fn next_chapter_order(&self, book_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(MAX(order_index), -1) + 1 FROM chapters WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to get chapter order: {}", e)))
    }

    /// Update chapter title and content.
    pub fn update_chapter(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        content: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE chapters SET title = ?1, content = ?2, updated_at = ?3
                 WHERE id = ?4 AND book_id IN (SELECT id FROM books WHERE owner_id = ?5)",
                params![title, content, now_timestamp(), id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update chapter: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete a chapter.
    pub fn delete_chapter(&self, id: &str, owner_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM chapters
                 WHERE id = ?1 AND book_id IN (SELECT id FROM books WHERE owner_id = ?2)",
                params![id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete chapter: {}", e)))?;
        Ok(rows > 0)
    }

    /// Re-rank chapters of a book to match the given id order. The list must
    /// name every chapter of the book exactly once; anything else is a
    /// validation error and the old ranks stay intact. Runs in a single
    /// transaction so a failing update rolls the whole reorder back.
    pub fn reorder_chapters(&self, book_id: &str, ordered_ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let total: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
                params![book_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count chapters: {}", e)))?;
        if ordered_ids.len() as i64 != total {
            return Err(AppError::Validation(
                "Reorder must list every chapter of the book".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut updated = 0;
        for (index, id) in ordered_ids.iter().enumerate() {
            if !seen.insert(id.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate chapter id in reorder: {}",
                    id
                )));
            }
            let rows = tx
                .execute(
                    "UPDATE chapters SET order_index = ?1, updated_at = ?2
                     WHERE id = ?3 AND book_id = ?4",
                    params![index as i64, now_timestamp(), id, book_id],
                )
                .map_err(|e| AppError::Internal(format!("Failed to reorder chapter: {}", e)))?;
            if rows != 1 {
                return Err(AppError::Validation(format!(
                    "Unknown chapter id in reorder: {}",
                    id
                )));
            }
            updated += rows;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit reorder: {}", e)))?;
        Ok(updated)
    }

    // ========== ELEMENT OPERATIONS ==========

    fn row_to_element(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookElement> {
        let kind: String = row.get(2)?;
        Ok(BookElement {
            id: row.get(0)?,
            book_id: row.get(1)?,
            kind: ElementKind::parse(&kind).unwrap_or(ElementKind::Preface),
            title: row.get(3)?,
            content: row.get(4)?,
            order_index: row.get(5)?,
            enabled: row.get(6)?,
        })
    }

    /// Create a supporting element.
    pub fn create_element(&self, element: &BookElement) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_elements (id, book_id, kind, title, content, order_index, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                element.id,
                element.book_id,
                element.kind.as_str(),
                element.title,
                element.content,
                element.order_index,
                element.enabled,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create element: {}", e)))?;
        Ok(())
    }

    /// Get an element, scoped through book ownership.
    pub fn get_element(&self, id: &str, owner_id: &str) -> Result<Option<BookElement>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT e.id, e.book_id, e.kind, e.title, e.content, e.order_index, e.enabled
             FROM book_elements e JOIN books b ON e.book_id = b.id
             WHERE e.id = ?1 AND b.owner_id = ?2",
            params![id, owner_id],
            Self::row_to_element,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get element: {}", e)))
    }

    /// List all elements of a book ordered by order_index.
    pub fn list_elements(&self, book_id: &str) -> Result<Vec<BookElement>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, kind, title, content, order_index, enabled
                 FROM book_elements WHERE book_id = ?1 ORDER BY order_index",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let elements = stmt
            .query_map(params![book_id], Self::row_to_element)
            .map_err(|e| AppError::Internal(format!("Failed to list elements: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect elements: {}", e)))?;

        Ok(elements)
    }

    /// List enabled elements of a book ordered by order_index.
    pub fn list_enabled_elements(&self, book_id: &str) -> Result<Vec<BookElement>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, kind, title, content, order_index, enabled
                 FROM book_elements WHERE book_id = ?1 AND enabled = 1 ORDER BY order_index",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let elements = stmt
            .query_map(params![book_id], Self::row_to_element)
            .map_err(|e| AppError::Internal(format!("Failed to list elements: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect elements: {}", e)))?;

        Ok(elements)
    }

    /// Next free order_index for a new element.
    pub fn next_element_order(&self, book_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(MAX(order_index), -1) + 1 FROM book_elements WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to get element order: {}", e)))
    }

    /// Update element title, content, enabled flag and rank.
    pub fn update_element(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        content: Option<&str>,
        enabled: bool,
        order_index: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE book_elements SET title = ?1, content = ?2, enabled = ?3, order_index = ?4
                 WHERE id = ?5 AND book_id IN (SELECT id FROM books WHERE owner_id = ?6)",
                params![title, content, enabled, order_index, id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update element: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete an element.
    pub fn delete_element(&self, id: &str, owner_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM book_elements
                 WHERE id = ?1 AND book_id IN (SELECT id FROM books WHERE owner_id = ?2)",
                params![id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete element: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== IMAGE OPERATIONS ==========

    fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
        let layout: Option<String> = row.get(12)?;
        let text_wrap: Option<String> = row.get(13)?;
        Ok(Image {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            book_id: row.get(2)?,
            chapter_id: row.get(3)?,
            storage_path: row.get(4)?,
            alt_text: row.get(5)?,
            file_size: row.get(6)?,
            mime_type: row.get(7)?,
            position_x: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
            position_y: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
            scale: row.get::<_, Option<f64>>(10)?.unwrap_or(1.0),
            z_index: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
            layout: layout.as_deref().map(ImageLayout::parse).unwrap_or_default(),
            text_wrap: text_wrap.as_deref().map(TextWrap::parse).unwrap_or_default(),
            created_at: row.get(14)?,
        })
    }

    const IMAGE_COLUMNS: &'static str = "id, owner_id, book_id, chapter_id, storage_path, \
         alt_text, file_size, mime_type, position_x, position_y, scale, z_index, layout, \
         text_wrap, created_at";

    /// Create an image row.
    pub fn create_image(&self, image: &Image) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO images (id, owner_id, book_id, chapter_id, storage_path, alt_text,
                                 file_size, mime_type, position_x, position_y, scale, z_index,
                                 layout, text_wrap, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                image.id,
                image.owner_id,
                image.book_id,
                image.chapter_id,
                image.storage_path,
                image.alt_text,
                image.file_size,
                image.mime_type,
                image.position_x,
                image.position_y,
                image.scale,
                image.z_index,
                image.layout.as_str(),
                image.text_wrap.as_str(),
                image.created_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create image: {}", e)))?;
        Ok(())
    }

    /// Get an image owned by the caller.
    pub fn get_image(&self, id: &str, owner_id: &str) -> Result<Option<Image>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM images WHERE id = ?1 AND owner_id = ?2",
                Self::IMAGE_COLUMNS
            ),
            params![id, owner_id],
            Self::row_to_image,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get image: {}", e)))
    }

    /// List images attached to a book (including chapter-level ones).
    pub fn list_book_images(&self, book_id: &str) -> Result<Vec<Image>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM images WHERE book_id = ?1 ORDER BY created_at",
                Self::IMAGE_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let images = stmt
            .query_map(params![book_id], Self::row_to_image)
            .map_err(|e| AppError::Internal(format!("Failed to list images: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect images: {}", e)))?;

        Ok(images)
    }

    /// Write the drag-release position.
    pub fn update_image_position(
        &self,
        id: &str,
        owner_id: &str,
        position_x: f64,
        position_y: f64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE images SET position_x = ?1, position_y = ?2
                 WHERE id = ?3 AND owner_id = ?4",
                params![position_x, position_y, id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update position: {}", e)))?;
        Ok(rows > 0)
    }

    /// Write the explicit-save layout properties.
    #[allow(clippy::too_many_arguments)]
    pub fn update_image_layout(
        &self,
        id: &str,
        owner_id: &str,
        scale: f64,
        z_index: i64,
        layout: ImageLayout,
        text_wrap: TextWrap,
        alt_text: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE images SET scale = ?1, z_index = ?2, layout = ?3, text_wrap = ?4,
                                   alt_text = ?5
                 WHERE id = ?6 AND owner_id = ?7",
                params![
                    scale,
                    z_index,
                    layout.as_str(),
                    text_wrap.as_str(),
                    alt_text,
                    id,
                    owner_id
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update layout: {}", e)))?;
        Ok(rows > 0)
    }

    /// Reset all layout properties in one update.
    pub fn reset_image_layout(&self, id: &str, owner_id: &str) -> Result<bool> {
        let props = LayoutProps::default();

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE images SET position_x = ?1, position_y = ?2, scale = ?3, z_index = ?4,
                                   layout = ?5, text_wrap = ?6
                 WHERE id = ?7 AND owner_id = ?8",
                params![
                    props.position_x,
                    props.position_y,
                    props.scale,
                    props.z_index,
                    props.layout.as_str(),
                    props.text_wrap.as_str(),
                    id,
                    owner_id
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to reset layout: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete an image row.
    pub fn delete_image(&self, id: &str, owner_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM images WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete image: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== COVER OPERATIONS ==========

    /// Associate an image as the book cover. Any previous association is
    /// deleted first; no history is kept.
    pub fn set_book_cover(&self, book_id: &str, image_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM book_covers WHERE book_id = ?1",
            params![book_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to clear cover: {}", e)))?;

        tx.execute(
            "INSERT INTO book_covers (book_id, image_id, created_at) VALUES (?1, ?2, ?3)",
            params![book_id, image_id, now_timestamp()],
        )
        .map_err(|e| AppError::Internal(format!("Failed to set cover: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit cover: {}", e)))?;
        Ok(())
    }

    /// Get the cover association for a book.
    pub fn get_book_cover(&self, book_id: &str) -> Result<Option<BookCover>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, image_id, created_at FROM book_covers WHERE book_id = ?1",
            params![book_id],
            |row| {
                Ok(BookCover {
                    book_id: row.get(0)?,
                    image_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get cover: {}", e)))
    }

    // ========== AI SESSION OPERATIONS ==========

    /// Record a heuristic invocation.
    pub fn create_ai_session(&self, session: &AiSession) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ai_sessions (id, user_id, book_id, chapter_id, provider, kind,
                                      prompt_excerpt, output, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.user_id,
                session.book_id,
                session.chapter_id,
                session.provider,
                session.kind,
                session.prompt_excerpt,
                session.output,
                session.created_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create AI session: {}", e)))?;
        Ok(())
    }

    /// List heuristic invocations of a user, newest first.
    pub fn list_ai_sessions(&self, user_id: &str) -> Result<Vec<AiSession>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, book_id, chapter_id, provider, kind, prompt_excerpt,
                        output, created_at
                 FROM ai_sessions WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let sessions = stmt
            .query_map(params![user_id], |row| {
                Ok(AiSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    book_id: row.get(2)?,
                    chapter_id: row.get(3)?,
                    provider: row.get(4)?,
                    kind: row.get(5)?,
                    prompt_excerpt: row.get(6)?,
                    output: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list AI sessions: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect AI sessions: {}", e)))?;

        Ok(sessions)
    }

    // ========== ACTIVITY OPERATIONS ==========

    /// Append an activity log row.
    pub fn log_activity(&self, entry: &ActivityEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO activity_log (id, user_id, book_id, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.user_id,
                entry.book_id,
                entry.action,
                entry.detail,
                entry.created_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to log activity: {}", e)))?;
        Ok(())
    }

    /// List activity of a user, newest first.
    pub fn list_activity(&self, user_id: &str) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, book_id, action, detail, created_at
                 FROM activity_log WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(ActivityEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    book_id: row.get(2)?,
                    action: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list activity: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect activity: {}", e)))?;

        Ok(entries)
    }
}
