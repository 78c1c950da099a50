//! Book catalog: authoring, browsing and search.

use crate::auth::{Identity, authorize, require_author, visible_book};
use crate::db::{Book, BookFilter, Database, now_timestamp};
use crate::error::{AppError, Result};
use crate::uploads::StoredFile;
use crate::validate;
use serde::{Deserialize, Serialize};

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Fields for a new book.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookDraft {
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Genre.
    #[serde(default)]
    pub genre: Option<String>,
    /// Page count.
    #[serde(default)]
    pub total_pages: Option<i64>,
}

/// Partial update of a book; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New genre.
    #[serde(default)]
    pub genre: Option<String>,
    /// New page count.
    #[serde(default)]
    pub total_pages: Option<i64>,
    /// Publish or unpublish.
    #[serde(default)]
    pub is_published: Option<bool>,
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    /// Rows to skip.
    #[serde(default)]
    pub skip: Option<i64>,
    /// Rows to return.
    #[serde(default)]
    pub limit: Option<i64>,
}

impl PageRequest {
    /// Skip and limit with defaults applied and limit clamped to 1..=100.
    pub fn normalized(&self) -> (i64, i64) {
        let skip = self.skip.unwrap_or(0).max(0);
        let limit = self.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (skip, limit)
    }
}

/// One page of books.
#[derive(Debug, Clone, Serialize)]
pub struct BookPage {
    /// Books on this page.
    pub books: Vec<Book>,
    /// Matching books across all pages.
    pub total_count: i64,
    /// Rows skipped.
    pub skip: i64,
    /// Page size.
    pub limit: i64,
    /// Whether another page follows.
    pub has_more: bool,
}

impl BookPage {
    fn new(books: Vec<Book>, total_count: i64, skip: i64, limit: i64) -> Self {
        let has_more = skip + (books.len() as i64) < total_count;
        Self {
            books,
            total_count,
            skip,
            limit,
            has_more,
        }
    }
}

/// Book catalog service.
#[derive(Clone)]
pub struct BookCatalog {
    db: Database,
}

impl BookCatalog {
    /// Create a catalog over the database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a draft book owned by the requesting author.
    pub fn create(&self, identity: &Identity, draft: BookDraft) -> Result<Book> {
        let author_id = require_author(identity)?;

        let title = draft.title.trim().to_string();
        validate::book_title(&title)?;
        validate::genre(draft.genre.as_deref())?;
        validate::total_pages(draft.total_pages)?;

        if self.db.book_title_taken(author_id, &title, None)? {
            return Err(AppError::Conflict(format!(
                "You already have a book titled '{}'",
                title
            )));
        }

        let now = now_timestamp();
        let book = Book {
            id: uuid::Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            title,
            description: draft.description,
            genre: draft.genre,
            total_pages: draft.total_pages,
            is_published: false,
            published_at: None,
            file_path: None,
            file_size: None,
            file_type: None,
            cover_path: None,
            read_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.db.create_book(&book)?;
        tracing::info!(book_id = %book.id, author_id = %book.author_id, "Book created");
        Ok(book)
    }

    /// Get a book; drafts are hidden from everyone but the owner and admins.
    pub fn get(&self, identity: Option<&Identity>, id: &str) -> Result<Book> {
        visible_book(identity, self.db.get_book(id)?)
    }

    /// Get a book the requester may modify.
    pub fn get_owned(&self, identity: &Identity, id: &str) -> Result<Book> {
        let book = self.db.get_book(id)?;
        authorize(identity, book.as_ref(), "Book").cloned()
    }

    /// List published books, newest first.
    pub fn list(
        &self,
        genre: Option<String>,
        author_id: Option<String>,
        page: PageRequest,
    ) -> Result<BookPage> {
        let filter = BookFilter {
            genre: non_blank(genre),
            author_id: non_blank(author_id),
            published_only: true,
            ..Default::default()
        };
        self.page(&filter, page)
    }

    /// Search published books by title, description or genre.
    pub fn search(
        &self,
        query: &str,
        genre: Option<String>,
        page: PageRequest,
    ) -> Result<BookPage> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }

        let filter = BookFilter {
            query: Some(query.to_string()),
            genre: non_blank(genre),
            published_only: true,
            ..Default::default()
        };
        self.page(&filter, page)
    }

    /// Books of one author; drafts are included for the owner and admins.
    pub fn author_books(
        &self,
        identity: Option<&Identity>,
        author_id: &str,
        page: PageRequest,
    ) -> Result<BookPage> {
        if self.db.get_author(author_id)?.is_none() {
            return Err(AppError::NotFound("Author not found".to_string()));
        }

        let privileged = identity.is_some_and(|identity| {
            identity.is_admin() || identity.author_id.as_deref() == Some(author_id)
        });

        let filter = BookFilter {
            author_id: Some(author_id.to_string()),
            published_only: !privileged,
            ..Default::default()
        };
        self.page(&filter, page)
    }

    /// Apply a patch to a book the requester owns.
    pub fn update(&self, identity: &Identity, id: &str, patch: BookPatch) -> Result<Book> {
        let mut book = self.get_owned(identity, id)?;

        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            validate::book_title(&title)?;
            if title != book.title
                && self
                    .db
                    .book_title_taken(&book.author_id, &title, Some(&book.id))?
            {
                return Err(AppError::Conflict(format!(
                    "Author already has a book titled '{}'",
                    title
                )));
            }
            book.title = title;
        }
        if let Some(description) = patch.description {
            book.description = Some(description);
        }
        if let Some(genre) = patch.genre {
            validate::genre(Some(&genre))?;
            book.genre = Some(genre);
        }
        if let Some(total_pages) = patch.total_pages {
            validate::total_pages(Some(total_pages))?;
            book.total_pages = Some(total_pages);
        }

        let now = now_timestamp();
        match patch.is_published {
            Some(true) if book.published_at.is_none() => {
                book.is_published = true;
                book.published_at = Some(now);
            }
            Some(true) => book.is_published = true,
            Some(false) => {
                book.is_published = false;
                book.published_at = None;
            }
            None => {}
        }
        book.updated_at = now;

        self.db.update_book(&book)?;
        tracing::info!(book_id = %book.id, published = book.is_published, "Book updated");
        Ok(book)
    }

    /// Delete a book and its reading progress; returns the removed record.
    pub fn delete(&self, identity: &Identity, id: &str) -> Result<Book> {
        let book = self.get_owned(identity, id)?;

        if !self.db.delete_book(&book.id)? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        tracing::info!(book_id = %book.id, by = %identity.user_id, "Book deleted");
        Ok(book)
    }

    /// Record an uploaded book file on a book the requester owns.
    pub fn attach_file(&self, identity: &Identity, id: &str, file: &StoredFile) -> Result<Book> {
        let mut book = self.get_owned(identity, id)?;

        book.file_path = Some(file.path.to_string_lossy().into_owned());
        book.file_size = Some(file.size as i64);
        book.file_type = Some(file.format.extension().to_string());
        if book.total_pages.is_none() {
            book.total_pages = file.page_count.map(|p| p as i64);
        }
        book.updated_at = now_timestamp();

        self.db.update_book(&book)?;
        Ok(book)
    }

    /// Record an uploaded cover on a book the requester owns.
    pub fn attach_cover(&self, identity: &Identity, id: &str, cover_path: &str) -> Result<Book> {
        let mut book = self.get_owned(identity, id)?;
        book.cover_path = Some(cover_path.to_string());
        book.updated_at = now_timestamp();
        self.db.update_book(&book)?;
        Ok(book)
    }

    fn page(&self, filter: &BookFilter, page: PageRequest) -> Result<BookPage> {
        let (skip, limit) = page.normalized();
        let (books, total) = self.db.list_books(filter, skip, limit)?;
        Ok(BookPage::new(books, total, skip, limit))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
