//! Ownership and role checks.

use crate::db::{Author, Book, ROLE_ADMIN};
use crate::error::{AppError, Result};

/// The verified requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Role ("admin" or "user").
    pub role: String,
    /// Author profile ID, if the user has one.
    pub author_id: Option<String>,
}

impl Identity {
    /// Check for the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// A resource with an owner.
pub trait Owned {
    /// Whether `identity` owns this resource.
    fn is_owned_by(&self, identity: &Identity) -> bool;
}

impl Owned for Book {
    fn is_owned_by(&self, identity: &Identity) -> bool {
        identity.author_id.as_deref() == Some(self.author_id.as_str())
    }
}

impl Owned for Author {
    fn is_owned_by(&self, identity: &Identity) -> bool {
        identity.user_id == self.user_id
    }
}

/// Check that `resource` exists and that `identity` owns it or is an admin.
pub fn authorize<'a, R: Owned>(
    identity: &Identity,
    resource: Option<&'a R>,
    what: &str,
) -> Result<&'a R> {
    let resource = resource.ok_or_else(|| AppError::NotFound(format!("{} not found", what)))?;

    if identity.is_admin() || resource.is_owned_by(identity) {
        Ok(resource)
    } else {
        Err(AppError::Forbidden(format!(
            "Not allowed to modify this {}",
            what.to_lowercase()
        )))
    }
}

/// Require an author profile, returning its ID.
pub fn require_author(identity: &Identity) -> Result<&str> {
    identity
        .author_id
        .as_deref()
        .ok_or_else(|| AppError::Forbidden("Only authors can perform this action".to_string()))
}

/// Whether a book is visible to the requester.
///
/// Drafts are visible to their owner and admins only.
pub fn can_view(identity: Option<&Identity>, book: &Book) -> bool {
    book.is_published
        || identity.is_some_and(|identity| identity.is_admin() || book.is_owned_by(identity))
}

/// Look up a book as seen by the requester; hidden drafts read as missing.
pub fn visible_book(identity: Option<&Identity>, book: Option<Book>) -> Result<Book> {
    match book {
        Some(book) if can_view(identity, &book) => Ok(book),
        _ => Err(AppError::NotFound("Book not found".to_string())),
    }
}
