use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, bio, \
     is_author, is_active, role, created_at, updated_at, last_login";

const AUTHOR_COLUMNS: &str = "id, user_id, pen_name, bio, profile_image_url, social_links, \
     total_books, total_reads, created_at, updated_at";

const BOOK_COLUMNS: &str = "id, author_id, title, description, genre, total_pages, is_published, \
     published_at, file_path, file_size, file_type, cover_path, read_count, created_at, updated_at";

const PROGRESS_COLUMNS: &str = "id, user_id, book_id, current_page, total_pages, \
     reading_time_minutes, is_completed, started_at, last_read_at, completed_at, created_at, updated_at";

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

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                bio TEXT,
                is_author INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Author profiles
            CREATE TABLE IF NOT EXISTS authors (
                id TEXT PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                pen_name TEXT NOT NULL,
                bio TEXT,
                profile_image_url TEXT,
                social_links TEXT NOT NULL DEFAULT '{}',
                total_books INTEGER NOT NULL DEFAULT 0,
                total_reads INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                genre TEXT,
                total_pages INTEGER,
                is_published INTEGER NOT NULL DEFAULT 0,
                published_at INTEGER,
                file_path TEXT,
                file_size INTEGER,
                file_type TEXT,
                cover_path TEXT,
                read_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (author_id, title),
                FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
            );

            -- Reading progress table
            CREATE TABLE IF NOT EXISTS reading_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                current_page INTEGER NOT NULL DEFAULT 0,
                total_pages INTEGER,
                reading_time_minutes INTEGER NOT NULL DEFAULT 0,
                is_completed INTEGER NOT NULL DEFAULT 0,
                started_at INTEGER NOT NULL,
                last_read_at INTEGER,
                completed_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Revoked tokens (logout)
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                jti TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_author ON books(author_id);
            CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre);
            CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
            CREATE INDEX IF NOT EXISTS idx_progress_user ON reading_progress(user_id);
            CREATE INDEX IF NOT EXISTS idx_progress_book ON reading_progress(book_id);
            CREATE INDEX IF NOT EXISTS idx_revoked_expires ON revoked_tokens(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        insert_user(&conn, user)
    }

    /// Create a user together with its author profile.
    pub fn create_user_with_author(&self, user: &User, author: &Author) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_user(&tx, user)?;
        insert_author(&tx, author)?;
        tx.execute(
            "UPDATE users SET is_author = 1 WHERE id = ?1",
            params![user.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by email (case-insensitive).
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by username, falling back to email.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        match self.get_user_by_username(login)? {
            Some(user) => Ok(Some(user)),
            None => self.get_user_by_email(login),
        }
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM users ORDER BY username",
                USER_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, now_timestamp(), user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user profile fields.
    pub fn update_user_profile(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2, bio = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                user.first_name,
                user.last_name,
                user.bio,
                user.updated_at,
                user.id
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update profile: {}", e)))?;
        Ok(())
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

    /// Activate or deactivate a user.
    pub fn set_user_active(&self, username: &str, active: bool) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE username = ?3",
                params![active, now_timestamp(), username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update user: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== AUTHOR OPERATIONS ==========

    /// Create an author profile and flag its user as an author.
    pub fn create_author(&self, author: &Author) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_author(&tx, author)?;
        tx.execute(
            "UPDATE users SET is_author = 1, updated_at = ?1 WHERE id = ?2",
            params![author.created_at, author.user_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get author by ID.
    pub fn get_author(&self, id: &str) -> Result<Option<Author>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM authors WHERE id = ?1", AUTHOR_COLUMNS),
            params![id],
            row_to_author,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get author: {}", e)))
    }

    /// Get the author profile of a user.
    pub fn get_author_by_user(&self, user_id: &str) -> Result<Option<Author>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM authors WHERE user_id = ?1", AUTHOR_COLUMNS),
            params![user_id],
            row_to_author,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get author: {}", e)))
    }

    /// List authors by pen name, with total count.
    pub fn list_authors(&self, skip: i64, limit: i64) -> Result<(Vec<Author>, i64)> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM authors", [], |row| row.get(0))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM authors ORDER BY pen_name LIMIT ?1 OFFSET ?2",
                AUTHOR_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let authors = stmt
            .query_map(params![limit, skip], row_to_author)
            .map_err(|e| AppError::Internal(format!("Failed to list authors: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect authors: {}", e)))?;

        Ok((authors, total))
    }

    /// Update author profile fields.
    pub fn update_author(&self, author: &Author) -> Result<()> {
        let social_links = serde_json::to_string(&author.social_links)
            .map_err(|e| AppError::Internal(format!("Failed to encode social links: {}", e)))?;

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE authors SET pen_name = ?1, bio = ?2, profile_image_url = ?3,
                    social_links = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                author.pen_name,
                author.bio,
                author.profile_image_url,
                social_links,
                author.updated_at,
                author.id,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update author: {}", e)))?;
        Ok(())
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book and bump its author's book count.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO books ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                BOOK_COLUMNS
            ),
            params![
                book.id,
                book.author_id,
                book.title,
                book.description,
                book.genre,
                book.total_pages,
                book.is_published,
                book.published_at,
                book.file_path,
                book.file_size,
                book.file_type,
                book.cover_path,
                book.read_count,
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Book '{}' already exists for this author",
                    book.title
                ))
            } else {
                AppError::Internal(format!("Failed to create book: {}", e))
            }
        })?;
        tx.execute(
            "UPDATE authors SET total_books = total_books + 1 WHERE id = ?1",
            params![book.author_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Check whether an author already has a book with this title.
    pub fn book_title_taken(
        &self,
        author_id: &str,
        title: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM books
                 WHERE author_id = ?1 AND title = ?2 AND id != COALESCE(?3, '')",
                params![author_id, title, exclude_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to check title: {}", e)))?;
        Ok(count > 0)
    }

    /// Persist all mutable book fields.
    pub fn update_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE books SET title = ?1, description = ?2, genre = ?3, total_pages = ?4,
                    is_published = ?5, published_at = ?6, file_path = ?7, file_size = ?8,
                    file_type = ?9, cover_path = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                book.title,
                book.description,
                book.genre,
                book.total_pages,
                book.is_published,
                book.published_at,
                book.file_path,
                book.file_size,
                book.file_type,
                book.cover_path,
                book.updated_at,
                book.id,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Book '{}' already exists for this author",
                    book.title
                ))
            } else {
                AppError::Internal(format!("Failed to update book: {}", e))
            }
        })?;
        Ok(())
    }

    /// List books matching a filter, newest first, with total count.
    pub fn list_books(&self, filter: &BookFilter, skip: i64, limit: i64) -> Result<(Vec<Book>, i64)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if filter.published_only {
            conditions.push("is_published = 1");
        }
        if let Some(query) = filter.query.as_deref() {
            conditions.push(
                "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR genre LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(query);
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(genre) = filter.genre.as_deref() {
            conditions.push("genre LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(genre)));
        }
        if let Some(author_id) = filter.author_id.as_deref() {
            conditions.push("author_id = ?");
            values.push(Value::Text(author_id.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM books {}", where_clause),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))?;

        let mut page_values = values;
        page_values.push(Value::Integer(limit));
        page_values.push(Value::Integer(skip));

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                BOOK_COLUMNS, where_clause
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params_from_iter(page_values.iter()), row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok((books, total))
    }

    /// Delete a book, its reading progress rows, and fix up the author count.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let author_id: Option<String> = tx
            .query_row(
                "SELECT author_id FROM books WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(author_id) = author_id else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM reading_progress WHERE book_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE authors SET total_books = MAX(0, total_books - 1) WHERE id = ?1",
            params![author_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Insert a progress row and count the read on the book and its author.
    pub fn start_progress(&self, progress: &ReadingProgress) -> Result<ReadingProgress> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO reading_progress
             (user_id, book_id, current_page, total_pages, reading_time_minutes, is_completed,
              started_at, last_read_at, completed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                progress.user_id,
                progress.book_id,
                progress.current_page,
                progress.total_pages,
                progress.reading_time_minutes,
                progress.is_completed,
                progress.started_at,
                progress.last_read_at,
                progress.completed_at,
                progress.created_at,
                progress.updated_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Already reading this book".to_string())
            } else {
                AppError::Internal(format!("Failed to save progress: {}", e))
            }
        })?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE books SET read_count = read_count + 1 WHERE id = ?1",
            params![progress.book_id],
        )?;
        tx.execute(
            "UPDATE authors SET total_reads = total_reads + 1
             WHERE id = (SELECT author_id FROM books WHERE id = ?1)",
            params![progress.book_id],
        )?;
        tx.commit()?;

        Ok(ReadingProgress {
            id,
            ..progress.clone()
        })
    }

    /// Get reading progress for a book.
    pub fn get_progress(&self, user_id: &str, book_id: &str) -> Result<Option<ReadingProgress>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
                PROGRESS_COLUMNS
            ),
            params![user_id, book_id],
            row_to_progress,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get progress: {}", e)))
    }

    /// Apply a change to a progress row under the connection lock.
    ///
    /// The closure sees the stored row and returns the row to write back, so
    /// concurrent updates of one (user, book) pair never interleave.
    pub fn modify_progress<F>(
        &self,
        user_id: &str,
        book_id: &str,
        change: F,
    ) -> Result<Option<ReadingProgress>>
    where
        F: FnOnce(ReadingProgress) -> Result<ReadingProgress>,
    {
        let conn = self.conn.lock();

        let current = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
                    PROGRESS_COLUMNS
                ),
                params![user_id, book_id],
                row_to_progress,
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get progress: {}", e)))?;

        let Some(current) = current else {
            return Ok(None);
        };

        let updated = change(current)?;

        conn.execute(
            "UPDATE reading_progress SET current_page = ?1, total_pages = ?2,
                    reading_time_minutes = ?3, is_completed = ?4, started_at = ?5,
                    last_read_at = ?6, completed_at = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                updated.current_page,
                updated.total_pages,
                updated.reading_time_minutes,
                updated.is_completed,
                updated.started_at,
                updated.last_read_at,
                updated.completed_at,
                updated.updated_at,
                updated.id,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save progress: {}", e)))?;

        Ok(Some(updated))
    }

    /// List a user's progress rows, most recently updated first.
    pub fn list_user_progress(
        &self,
        user_id: &str,
        completed: Option<bool>,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<ReadingProgress>, i64)> {
        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reading_progress
                 WHERE user_id = ?1 AND (?2 IS NULL OR is_completed = ?2)",
                params![user_id, completed],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count progress: {}", e)))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM reading_progress
                 WHERE user_id = ?1 AND (?2 IS NULL OR is_completed = ?2)
                 ORDER BY COALESCE(last_read_at, started_at) DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
                PROGRESS_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id, completed, limit, skip], row_to_progress)
            .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect progress: {}", e)))?;

        Ok((rows, total))
    }

    /// Delete reading progress.
    pub fn delete_progress(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete progress: {}", e)))?;
        Ok(rows > 0)
    }

    /// Count progress rows referencing a book.
    pub fn count_book_progress(&self, book_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM reading_progress WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count progress: {}", e)))
    }

    /// Reading statistics for a book.
    pub fn book_reading_stats(&self, book_id: &str) -> Result<BookReadingStats> {
        let conn = self.conn.lock();
        let (total, completed): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_completed), 0)
                 FROM reading_progress WHERE book_id = ?1",
                params![book_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| AppError::Internal(format!("Failed to get stats: {}", e)))?;

        let completion_rate = if total > 0 {
            ((completed as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(BookReadingStats {
            total_readers: total,
            completed_readers: completed,
            currently_reading: total - completed,
            completion_rate,
        })
    }

    // ========== TOKEN REVOCATION ==========

    /// Record a revoked token. Revoking twice is a no-op.
    pub fn revoke_token(&self, revoked: &RevokedToken) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![revoked.jti, revoked.user_id, revoked.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to revoke token: {}", e)))?;
        Ok(())
    }

    /// Check whether a token ID was revoked.
    pub fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM revoked_tokens WHERE jti = ?1",
                params![jti],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check revocation: {}", e)))?;
        Ok(found.is_some())
    }

    /// Drop revocations whose tokens have expired anyway.
    pub fn purge_expired_revocations(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM revoked_tokens WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to purge revocations: {}", e)))?;
        Ok(rows)
    }
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            USER_COLUMNS
        ),
        params![
            user.id,
            user.username,
            user.email,
            user.password_hash,
            user.first_name,
            user.last_name,
            user.bio,
            user.is_author,
            user.is_active,
            user.role,
            user.created_at,
            user.updated_at,
            user.last_login,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!(
                "Username '{}' or email '{}' already registered",
                user.username, user.email
            ))
        } else {
            AppError::Internal(format!("Failed to create user: {}", e))
        }
    })?;
    Ok(())
}

fn insert_author(conn: &Connection, author: &Author) -> Result<()> {
    let social_links = serde_json::to_string(&author.social_links)
        .map_err(|e| AppError::Internal(format!("Failed to encode social links: {}", e)))?;

    conn.execute(
        &format!(
            "INSERT INTO authors ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            AUTHOR_COLUMNS
        ),
        params![
            author.id,
            author.user_id,
            author.pen_name,
            author.bio,
            author.profile_image_url,
            social_links,
            author.total_books,
            author.total_reads,
            author.created_at,
            author.updated_at,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("User already has an author profile".to_string())
        } else {
            AppError::Internal(format!("Failed to create author: {}", e))
        }
    })?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        bio: row.get(6)?,
        is_author: row.get(7)?,
        is_active: row.get(8)?,
        role: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_login: row.get(12)?,
    })
}

fn row_to_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<Author> {
    let social_links: String = row.get(5)?;
    let social_links = serde_json::from_str(&social_links).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Author {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pen_name: row.get(2)?,
        bio: row.get(3)?,
        profile_image_url: row.get(4)?,
        social_links,
        total_books: row.get(6)?,
        total_reads: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        genre: row.get(4)?,
        total_pages: row.get(5)?,
        is_published: row.get(6)?,
        published_at: row.get(7)?,
        file_path: row.get(8)?,
        file_size: row.get(9)?,
        file_type: row.get(10)?,
        cover_path: row.get(11)?,
        read_count: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReadingProgress> {
    Ok(ReadingProgress {
        id: row.get(0)?,
        user_id: row.get(1)?,
        book_id: row.get(2)?,
        current_page: row.get(3)?,
        total_pages: row.get(4)?,
        reading_time_minutes: row.get(5)?,
        is_completed: row.get(6)?,
        started_at: row.get(7)?,
        last_read_at: row.get(8)?,
        completed_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Build a LIKE pattern matching `needle` anywhere, escaping wildcards.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
