mod epub;
mod pdf;

pub use epub::EpubHandler;
pub use pdf::PdfHandler;

use crate::config::BookFormat;
use crate::error::{AppError, Result};

/// What an uploaded file turned out to contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Number of pages, for paginated formats.
    pub page_count: Option<u32>,
}

/// Trait for format-specific book handlers.
pub trait FormatHandler: Send + Sync {
    /// Check the bytes really are this format and read what we can from them.
    fn inspect(&self, data: &[u8]) -> Result<FileInfo>;

    /// Extract an embedded cover image of at most `max_size` bytes.
    fn extract_cover(&self, data: &[u8], max_size: usize) -> Result<Option<Vec<u8>>>;
}

/// Error for an embedded cover larger than the configured limit.
fn cover_too_large(max_size: usize) -> AppError {
    AppError::PayloadTooLarge(format!(
        "Embedded cover exceeds the {} byte limit",
        max_size
    ))
}

/// Get the appropriate handler for a book format.
pub fn get_handler(format: BookFormat) -> Box<dyn FormatHandler> {
    match format {
        BookFormat::Epub => Box::new(EpubHandler),
        BookFormat::Pdf => Box::new(PdfHandler),
        BookFormat::Txt => Box::new(TextHandler),
    }
}

/// Plain text: must be UTF-8, has no pages or cover.
struct TextHandler;

impl FormatHandler for TextHandler {
    fn inspect(&self, data: &[u8]) -> Result<FileInfo> {
        std::str::from_utf8(data)
            .map_err(|_| AppError::Validation("Text file is not valid UTF-8".to_string()))?;
        Ok(FileInfo::default())
    }

    fn extract_cover(&self, _data: &[u8], _max_size: usize) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
