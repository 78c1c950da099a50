//! Application state shared across handlers.

use crate::auth::{AuthService, TokenIssuer};
use crate::catalog::BookCatalog;
use crate::config::Config;
use crate::db::Database;
use crate::reading::ReadingTracker;
use crate::uploads::FileStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Book catalog.
    pub catalog: BookCatalog,
    /// Reading progress tracker.
    pub reading: ReadingTracker,
    /// Uploaded file storage.
    pub files: FileStore,
}

impl AppState {
    /// Create new application state with database and token signing secret.
    pub fn new(config: &Config, db: Database, secret: &[u8]) -> Self {
        let tokens = TokenIssuer::new(secret, config.auth.token_ttl_seconds());
        let auth = AuthService::new(db.clone(), tokens, config.auth.registration_enabled());

        Self {
            catalog: BookCatalog::new(db.clone()),
            reading: ReadingTracker::new(db.clone(), config.reading.merge_strategy),
            files: FileStore::new(config.uploads.clone()),
            auth: Arc::new(auth),
            db,
        }
    }
}
