//! Per-user reading progress.

use crate::auth::{Identity, visible_book};
use crate::catalog::PageRequest;
use crate::config::MergeStrategy;
use crate::db::{Book, BookReadingStats, Database, ReadingProgress, now_timestamp};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// A progress update from a reader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressUpdate {
    /// Page the reader is on; the stored page is kept when absent.
    #[serde(default)]
    pub current_page: Option<i64>,
    /// Minutes read since the last update.
    #[serde(default)]
    pub reading_time_minutes: i64,
    /// "reading", "paused", "completed" or "abandoned".
    #[serde(default)]
    pub status: Option<String>,
}

/// Progress with its computed percentage.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    /// Stored progress.
    #[serde(flatten)]
    pub progress: ReadingProgress,
    /// Percent of the book read, when the page count is known.
    pub percentage: Option<f64>,
}

impl From<ReadingProgress> for ProgressView {
    fn from(progress: ReadingProgress) -> Self {
        let percentage = progress.percentage();
        Self {
            progress,
            percentage,
        }
    }
}

/// Progress together with the book it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingEntry {
    /// Progress.
    #[serde(flatten)]
    pub progress: ProgressView,
    /// Book title.
    pub book_title: String,
    /// Owning author ID.
    pub author_id: String,
}

/// A page of reading entries.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingPage {
    /// Entries on this page.
    pub entries: Vec<ReadingEntry>,
    /// Matching entries overall.
    pub total_count: i64,
    /// Rows skipped.
    pub skip: i64,
    /// Page size.
    pub limit: i64,
    /// Whether another page follows.
    pub has_more: bool,
}

/// Reading progress tracker.
#[derive(Clone)]
pub struct ReadingTracker {
    db: Database,
    strategy: MergeStrategy,
}

impl ReadingTracker {
    /// Create a tracker.
    pub fn new(db: Database, strategy: MergeStrategy) -> Self {
        Self { db, strategy }
    }

    /// Start reading a book, or return the existing progress.
    ///
    /// The flag is true when a new progress row was created.
    pub fn start_reading(
        &self,
        identity: &Identity,
        book_id: &str,
    ) -> Result<(ProgressView, bool)> {
        let book = visible_book(Some(identity), self.db.get_book(book_id)?)?;

        if let Some(existing) = self.db.get_progress(&identity.user_id, &book.id)? {
            return Ok((existing.into(), false));
        }

        let now = now_timestamp();
        let progress = ReadingProgress {
            id: 0,
            user_id: identity.user_id.clone(),
            book_id: book.id.clone(),
            current_page: 0,
            total_pages: book.total_pages,
            reading_time_minutes: 0,
            is_completed: false,
            started_at: now,
            last_read_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.db.start_progress(&progress) {
            Ok(created) => {
                tracing::info!(user_id = %identity.user_id, book_id = %book.id, "Started reading");
                Ok((created.into(), true))
            }
            // Lost a race with a concurrent start for the same pair
            Err(AppError::Conflict(_)) => {
                let existing = self
                    .db
                    .get_progress(&identity.user_id, &book.id)?
                    .ok_or_else(|| {
                        AppError::Internal("Progress vanished after insert conflict".to_string())
                    })?;
                Ok((existing.into(), false))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a progress update.
    pub fn update_progress(
        &self,
        identity: &Identity,
        book_id: &str,
        update: ProgressUpdate,
    ) -> Result<ProgressView> {
        let book = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let now = now_timestamp();
        let strategy = self.strategy;

        let updated = self
            .db
            .modify_progress(&identity.user_id, book_id, |current| {
                apply_update(current, &book, &update, strategy, now)
            })?
            .ok_or_else(|| {
                AppError::NotFound("Start reading this book before updating progress".to_string())
            })?;

        tracing::debug!(
            user_id = %identity.user_id,
            book_id = %book_id,
            page = updated.current_page,
            completed = updated.is_completed,
            "Progress updated"
        );
        Ok(updated.into())
    }

    /// Progress of the requester on one book.
    pub fn get_progress(&self, identity: &Identity, book_id: &str) -> Result<ProgressView> {
        self.db
            .get_progress(&identity.user_id, book_id)?
            .map(ProgressView::from)
            .ok_or_else(|| AppError::NotFound("No reading progress for this book".to_string()))
    }

    /// Forget the requester's progress on one book.
    pub fn reset_progress(&self, identity: &Identity, book_id: &str) -> Result<()> {
        if !self.db.delete_progress(&identity.user_id, book_id)? {
            return Err(AppError::NotFound(
                "No reading progress for this book".to_string(),
            ));
        }
        tracing::info!(user_id = %identity.user_id, book_id = %book_id, "Progress reset");
        Ok(())
    }

    /// Books the requester has started but not finished.
    pub fn currently_reading(
        &self,
        identity: &Identity,
        page: PageRequest,
    ) -> Result<ReadingPage> {
        self.page(identity, false, page)
    }

    /// Books the requester has finished, most recent first.
    pub fn history(&self, identity: &Identity, page: PageRequest) -> Result<ReadingPage> {
        self.page(identity, true, page)
    }

    fn page(
        &self,
        identity: &Identity,
        completed: bool,
        page: PageRequest,
    ) -> Result<ReadingPage> {
        let (skip, limit) = page.normalized();
        let (rows, total) = self
            .db
            .list_user_progress(&identity.user_id, Some(completed), skip, limit)?;
        let has_more = skip + (rows.len() as i64) < total;
        let entries = self.entries(rows)?;

        Ok(ReadingPage {
            entries,
            total_count: total,
            skip,
            limit,
            has_more,
        })
    }

    /// Reader statistics of a visible book.
    pub fn book_stats(
        &self,
        identity: Option<&Identity>,
        book_id: &str,
    ) -> Result<BookReadingStats> {
        let book = visible_book(identity, self.db.get_book(book_id)?)?;
        self.db.book_reading_stats(&book.id)
    }

    fn entries(&self, rows: Vec<ReadingProgress>) -> Result<Vec<ReadingEntry>> {
        let mut entries = Vec::with_capacity(rows.len());
        for progress in rows {
            let Some(book) = self.db.get_book(&progress.book_id)? else {
                continue;
            };
            entries.push(ReadingEntry {
                progress: progress.into(),
                book_title: book.title,
                author_id: book.author_id,
            });
        }
        Ok(entries)
    }
}

/// Compute the new progress row from an update.
fn apply_update(
    mut progress: ReadingProgress,
    book: &Book,
    update: &ProgressUpdate,
    strategy: MergeStrategy,
    now: i64,
) -> Result<ReadingProgress> {
    let total_pages = book.total_pages.or(progress.total_pages);

    if let Some(page) = update.current_page {
        if page < 0 {
            return Err(AppError::InvalidRange(
                "Current page cannot be negative".to_string(),
            ));
        }
        if let Some(total) = total_pages
            && page > total
        {
            return Err(AppError::InvalidRange(format!(
                "Current page {} exceeds total pages {}",
                page, total
            )));
        }
    }
    if update.reading_time_minutes < 0 {
        return Err(AppError::InvalidRange(
            "Reading time cannot be negative".to_string(),
        ));
    }

    // Some(true) completes, Some(false) reopens, None leaves completion to the page
    let explicit = match update.status.as_deref() {
        None | Some("paused") | Some("abandoned") => None,
        Some("reading") => Some(false),
        Some("completed") => Some(true),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "Unknown status '{}', expected reading, paused, completed or abandoned",
                other
            )));
        }
    };

    let merged = match (strategy, update.current_page) {
        (_, None) => progress.current_page,
        (MergeStrategy::Latest, Some(page)) => page,
        (MergeStrategy::Furthest, Some(page)) => progress.current_page.max(page),
    };
    // The page count may have shrunk since the stored page was recorded
    progress.current_page = match total_pages {
        Some(total) => merged.min(total),
        None => merged,
    };
    progress.total_pages = total_pages;
    progress.reading_time_minutes = progress
        .reading_time_minutes
        .checked_add(update.reading_time_minutes)
        .ok_or_else(|| AppError::InvalidRange("Reading time is out of range".to_string()))?;

    let reached_end = total_pages.is_some_and(|total| progress.current_page >= total);
    let completed = explicit.unwrap_or(progress.is_completed || reached_end);

    if completed && !progress.is_completed {
        progress.completed_at = Some(now);
    } else if !completed {
        progress.completed_at = None;
    }
    progress.is_completed = completed;
    progress.last_read_at = Some(now);
    progress.updated_at = now;

    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(total_pages: Option<i64>) -> Book {
        Book {
            id: "b1".to_string(),
            author_id: "a1".to_string(),
            title: "T".to_string(),
            description: None,
            genre: None,
            total_pages,
            is_published: true,
            published_at: Some(0),
            file_path: None,
            file_size: None,
            file_type: None,
            cover_path: None,
            read_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn progress(page: i64, total: Option<i64>) -> ReadingProgress {
        ReadingProgress {
            id: 1,
            user_id: "u1".to_string(),
            book_id: "b1".to_string(),
            current_page: page,
            total_pages: total,
            reading_time_minutes: 10,
            is_completed: false,
            started_at: 0,
            last_read_at: None,
            completed_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn update(page: i64, minutes: i64, status: Option<&str>) -> ProgressUpdate {
        ProgressUpdate {
            current_page: Some(page),
            reading_time_minutes: minutes,
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_page_past_end_is_invalid_range() {
        let err = apply_update(
            progress(0, Some(100)),
            &book(Some(100)),
            &update(101, 0, None),
            MergeStrategy::Latest,
            50,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRange(_)));
    }

    #[test]
    fn test_negative_values_rejected() {
        for u in [update(-1, 0, None), update(5, -3, None)] {
            let err = apply_update(
                progress(0, Some(100)),
                &book(Some(100)),
                &u,
                MergeStrategy::Latest,
                50,
            )
            .unwrap_err();
            assert!(matches!(err, AppError::InvalidRange(_)));
        }
    }

    #[test]
    fn test_time_accumulates_and_page_moves() {
        let p = apply_update(
            progress(10, Some(100)),
            &book(Some(100)),
            &update(40, 15, None),
            MergeStrategy::Latest,
            50,
        )
        .unwrap();
        assert_eq!(p.current_page, 40);
        assert_eq!(p.reading_time_minutes, 25);
        assert_eq!(p.last_read_at, Some(50));
        assert!(!p.is_completed);
    }

    #[test]
    fn test_latest_allows_going_back() {
        let p = apply_update(
            progress(80, Some(100)),
            &book(Some(100)),
            &update(20, 0, None),
            MergeStrategy::Latest,
            50,
        )
        .unwrap();
        assert_eq!(p.current_page, 20);
    }

    #[test]
    fn test_furthest_keeps_max() {
        let p = apply_update(
            progress(80, Some(100)),
            &book(Some(100)),
            &update(20, 0, None),
            MergeStrategy::Furthest,
            50,
        )
        .unwrap();
        assert_eq!(p.current_page, 80);
    }

    #[test]
    fn test_reaching_end_completes() {
        let p = apply_update(
            progress(90, Some(100)),
            &book(Some(100)),
            &update(100, 5, None),
            MergeStrategy::Latest,
            77,
        )
        .unwrap();
        assert!(p.is_completed);
        assert_eq!(p.completed_at, Some(77));
    }

    #[test]
    fn test_status_overrides_completion() {
        let done = apply_update(
            progress(3, None),
            &book(None),
            &update(3, 0, Some("completed")),
            MergeStrategy::Latest,
            9,
        )
        .unwrap();
        assert!(done.is_completed);

        let reopened = apply_update(
            done,
            &book(None),
            &update(1, 0, Some("reading")),
            MergeStrategy::Latest,
            10,
        )
        .unwrap();
        assert!(!reopened.is_completed);
        assert_eq!(reopened.completed_at, None);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = apply_update(
            progress(0, None),
            &book(None),
            &update(1, 0, Some("skimming")),
            MergeStrategy::Latest,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_paused_and_abandoned_keep_completion() {
        let mut done = progress(100, Some(100));
        done.is_completed = true;
        done.completed_at = Some(5);

        for status in ["paused", "abandoned"] {
            let p = apply_update(
                done.clone(),
                &book(Some(100)),
                &update(40, 0, Some(status)),
                MergeStrategy::Latest,
                9,
            )
            .unwrap();
            assert_eq!(p.current_page, 40);
            assert!(p.is_completed);
            assert_eq!(p.completed_at, Some(5));
        }

        let p = apply_update(
            progress(10, Some(100)),
            &book(Some(100)),
            &update(12, 0, Some("paused")),
            MergeStrategy::Latest,
            9,
        )
        .unwrap();
        assert!(!p.is_completed);
    }

    #[test]
    fn test_status_only_update_keeps_page() {
        let status_only = ProgressUpdate {
            current_page: None,
            reading_time_minutes: 0,
            status: Some("completed".to_string()),
        };
        let p = apply_update(
            progress(30, Some(100)),
            &book(Some(100)),
            &status_only,
            MergeStrategy::Latest,
            12,
        )
        .unwrap();
        assert_eq!(p.current_page, 30);
        assert!(p.is_completed);
        assert_eq!(p.completed_at, Some(12));
    }

    #[test]
    fn test_status_only_update_deserializes() {
        let u: ProgressUpdate = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(u.current_page, None);
        assert_eq!(u.reading_time_minutes, 0);
    }

    #[test]
    fn test_reading_time_overflow_is_invalid_range() {
        let mut near_max = progress(0, Some(100));
        near_max.reading_time_minutes = i64::MAX;

        let err = apply_update(
            near_max,
            &book(Some(100)),
            &update(1, 1, None),
            MergeStrategy::Latest,
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRange(_)));

        // A single huge delta still fits
        let mut fresh = progress(0, Some(100));
        fresh.reading_time_minutes = 0;
        let once = apply_update(
            fresh,
            &book(Some(100)),
            &update(1, i64::MAX - 10, None),
            MergeStrategy::Latest,
            5,
        )
        .unwrap();
        assert_eq!(once.reading_time_minutes, i64::MAX - 10);

        let err = apply_update(
            once,
            &book(Some(100)),
            &update(1, i64::MAX, None),
            MergeStrategy::Latest,
            6,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRange(_)));
    }

    #[test]
    fn test_furthest_clamps_to_shrunk_page_count() {
        let p = apply_update(
            progress(80, Some(100)),
            &book(Some(50)),
            &update(20, 0, None),
            MergeStrategy::Furthest,
            50,
        )
        .unwrap();
        assert_eq!(p.current_page, 50);
        assert_eq!(p.total_pages, Some(50));
        assert!(p.is_completed);

        let status_only = ProgressUpdate {
            current_page: None,
            reading_time_minutes: 0,
            status: None,
        };
        let p = apply_update(
            progress(80, Some(100)),
            &book(Some(50)),
            &status_only,
            MergeStrategy::Latest,
            50,
        )
        .unwrap();
        assert_eq!(p.current_page, 50);
    }

    #[test]
    fn test_unknown_page_count_accepts_any_page() {
        let p = apply_update(
            progress(0, None),
            &book(None),
            &update(5000, 0, None),
            MergeStrategy::Latest,
            1,
        )
        .unwrap();
        assert_eq!(p.current_page, 5000);
        assert!(!p.is_completed);
    }
}
