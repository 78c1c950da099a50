//! Input validation for accounts, authors and books.

use crate::error::{AppError, Result};

const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Validate a username: 3-50 characters of letters, digits, `_` and `-`,
/// not starting or ending with `_` or `-`.
pub fn username(value: &str) -> Result<()> {
    let len = value.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AppError::Validation(
            "Username must be 3-50 characters".to_string(),
        ));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, _ and -".to_string(),
        ));
    }

    let edge = |c: Option<char>| matches!(c, Some('_' | '-'));
    if edge(value.chars().next()) || edge(value.chars().last()) {
        return Err(AppError::Validation(
            "Username cannot start or end with _ or -".to_string(),
        ));
    }

    Ok(())
}

/// Validate an email address.
pub fn email(value: &str) -> Result<()> {
    let invalid = || AppError::Validation("Invalid email format".to_string());

    if value.len() > 255 {
        return Err(AppError::Validation(
            "Email must be at most 255 characters".to_string(),
        ));
    }

    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));

    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    if local_ok && host_ok && tld_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Validate password strength: 8-100 characters with an uppercase letter,
/// a lowercase letter, a digit and a special character.
pub fn password(value: &str) -> Result<()> {
    let len = value.chars().count();
    if len < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if len > 100 {
        return Err(AppError::Validation(
            "Password must be at most 100 characters".to_string(),
        ));
    }

    let checks = [
        (
            value.chars().any(|c| c.is_ascii_uppercase()),
            "Password must contain an uppercase letter",
        ),
        (
            value.chars().any(|c| c.is_ascii_lowercase()),
            "Password must contain a lowercase letter",
        ),
        (
            value.chars().any(|c| c.is_ascii_digit()),
            "Password must contain a digit",
        ),
        (
            value.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
            "Password must contain a special character",
        ),
    ];

    match checks.iter().find(|(ok, _)| !ok) {
        Some((_, message)) => Err(AppError::Validation(message.to_string())),
        None => Ok(()),
    }
}

/// Validate a pen name: 2-100 letters, spaces, hyphens or apostrophes.
pub fn pen_name(value: &str) -> Result<()> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if !(2..=100).contains(&len) {
        return Err(AppError::Validation(
            "Pen name must be 2-100 characters".to_string(),
        ));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'')
    {
        return Err(AppError::Validation(
            "Pen name can only contain letters, spaces, hyphens and apostrophes".to_string(),
        ));
    }

    Ok(())
}

/// Validate a book title: 1-255 characters from a restricted set.
pub fn book_title(value: &str) -> Result<()> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if !(1..=255).contains(&len) {
        return Err(AppError::Validation(
            "Title must be 1-255 characters".to_string(),
        ));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || "-'.,!?()".contains(c))
    {
        return Err(AppError::Validation(
            "Title contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate an optional genre.
pub fn genre(value: Option<&str>) -> Result<()> {
    match value {
        Some(genre) if genre.chars().count() > 100 => Err(AppError::Validation(
            "Genre must be at most 100 characters".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validate an optional page count.
pub fn total_pages(value: Option<i64>) -> Result<()> {
    match value {
        Some(pages) if pages < 1 => Err(AppError::InvalidRange(
            "Total pages must be at least 1".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Replace characters that are unsafe in filenames.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if "<>:\"/\\|?*".contains(c) { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username() {
        assert!(username("reader_01").is_ok());
        assert!(username("ab").is_err());
        assert!(username("_reader").is_err());
        assert!(username("reader-").is_err());
        assert!(username("read er").is_err());
        assert!(username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_email() {
        assert!(email("reader@example.com").is_ok());
        assert!(email("first.last+tag@mail.example.org").is_ok());
        assert!(email("reader@example").is_err());
        assert!(email("reader@example.c").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("reader@@example.com").is_err());
        assert!(email("no-at-sign").is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(password("Str0ng!pass").is_ok());
        assert!(password("Sh0rt!").is_err());
        assert!(password("alllower1!").is_err());
        assert!(password("ALLUPPER1!").is_err());
        assert!(password("NoDigits!!").is_err());
        assert!(password("NoSpecial11").is_err());
    }

    #[test]
    fn test_pen_name() {
        assert!(pen_name("Mary O'Neil-Smith").is_ok());
        assert!(pen_name("J").is_err());
        assert!(pen_name("R2D2").is_err());
    }

    #[test]
    fn test_book_title() {
        assert!(book_title("Hello, World! (Part 1)").is_ok());
        assert!(book_title("   ").is_err());
        assert!(book_title("Bad <title>").is_err());
        assert!(book_title(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_total_pages() {
        assert!(total_pages(None).is_ok());
        assert!(total_pages(Some(1)).is_ok());
        assert!(matches!(
            total_pages(Some(0)),
            Err(AppError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my:book?.pdf"), "my_book_.pdf");
        assert_eq!(sanitize_filename("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_filename(" .. "), "file");
    }
}
