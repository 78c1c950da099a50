mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role for regular accounts.
pub const ROLE_USER: &str = "user";
/// Role with elevated privileges over every resource.
pub const ROLE_ADMIN: &str = "admin";

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login.
    pub username: String,
    /// Email address (also accepted for login).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Short biography.
    pub bio: Option<String>,
    /// Whether the user publishes books.
    pub is_author: bool,
    /// Inactive accounts cannot log in.
    pub is_active: bool,
    /// User role: "admin" or "user".
    pub role: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last profile update timestamp.
    pub updated_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Check if the user has the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Author profile, one per author user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    /// Author ID.
    pub id: String,
    /// Owning user ID.
    pub user_id: String,
    /// Public pen name.
    pub pen_name: String,
    /// Author biography.
    pub bio: Option<String>,
    /// Profile image URL.
    pub profile_image_url: Option<String>,
    /// Social links keyed by platform.
    pub social_links: BTreeMap<String, String>,
    /// Number of books owned.
    pub total_books: i64,
    /// Number of reads across all books.
    pub total_reads: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Book metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Owning author ID.
    pub author_id: String,
    /// Book title.
    pub title: String,
    /// Book description.
    pub description: Option<String>,
    /// Genre.
    pub genre: Option<String>,
    /// Page count, if known.
    pub total_pages: Option<i64>,
    /// Whether the book is visible to readers.
    pub is_published: bool,
    /// Publication timestamp.
    pub published_at: Option<i64>,
    /// Stored book file path.
    #[serde(skip_serializing)]
    pub file_path: Option<String>,
    /// Book file size in bytes.
    pub file_size: Option<i64>,
    /// Book file format (pdf, epub, txt).
    pub file_type: Option<String>,
    /// Stored cover image path.
    #[serde(skip_serializing)]
    pub cover_path: Option<String>,
    /// Number of readers who started the book.
    pub read_count: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Reading progress for a (user, book) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Progress ID.
    pub id: i64,
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Current page number (0 = not started).
    pub current_page: i64,
    /// Total pages in book when reading started.
    pub total_pages: Option<i64>,
    /// Cumulative reading time.
    pub reading_time_minutes: i64,
    /// Whether the book was finished.
    pub is_completed: bool,
    /// Started reading timestamp.
    pub started_at: i64,
    /// Last read timestamp.
    pub last_read_at: Option<i64>,
    /// Finished reading timestamp.
    pub completed_at: Option<i64>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl ReadingProgress {
    /// Reading percentage (0.0 - 100.0), rounded to two decimals.
    pub fn percentage(&self) -> Option<f64> {
        progress_percentage(self.current_page, self.total_pages)
    }
}

/// Compute reading percentage from a page position.
pub fn progress_percentage(current_page: i64, total_pages: Option<i64>) -> Option<f64> {
    let total = total_pages.filter(|t| *t > 0)?;
    let pct = (current_page as f64 / total as f64 * 100.0).min(100.0);
    Some((pct * 100.0).round() / 100.0)
}

/// Revoked token entry.
#[derive(Debug, Clone)]
pub struct RevokedToken {
    /// Token ID (`jti` claim).
    pub jti: String,
    /// User the token was issued to.
    pub user_id: String,
    /// Token expiry; the entry is useless afterwards.
    pub expires_at: i64,
}

/// Filter for book listings.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    /// Case-insensitive substring over title, description and genre.
    pub query: Option<String>,
    /// Case-insensitive substring over genre.
    pub genre: Option<String>,
    /// Restrict to one author.
    pub author_id: Option<String>,
    /// Only published books.
    pub published_only: bool,
}

/// Per-book reading statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookReadingStats {
    /// Users who started the book.
    pub total_readers: i64,
    /// Users who finished it.
    pub completed_readers: i64,
    /// Users still reading.
    pub currently_reading: i64,
    /// Completed / total, as a percentage.
    pub completion_rate: f64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
