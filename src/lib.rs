//! shelf-rs: an online library connecting authors and readers.
//!
//! Authors publish books (PDF, EPUB or plain text) and readers browse,
//! download and track their reading progress over a JSON HTTP API.
//!
//! # Features
//!
//! - User accounts with Argon2 password hashing
//! - Signed, expiring bearer tokens with logout revocation
//! - Author profiles and ownership-checked book management
//! - Book search and paginated listings
//! - Reading progress with completion tracking and per-book statistics
//! - Book file and cover uploads with content validation and thumbnails

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication, tokens and authorization.
pub mod auth;
/// Book catalog.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Book format handlers.
pub mod formats;
/// Reading progress tracking.
pub mod reading;
/// HTTP server.
pub mod server;
/// Uploaded file storage.
pub mod uploads;
/// Input validation.
pub mod validate;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
