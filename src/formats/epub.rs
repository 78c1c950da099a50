//! EPUB format handler.

use crate::error::{AppError, Result};
use crate::formats::{FileInfo, FormatHandler, cover_too_large};
use std::io::{Cursor, Read};
use zip::ZipArchive;

const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Handler for EPUB files.
pub struct EpubHandler;

impl EpubHandler {
    fn open(data: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(data))
            .map_err(|_| AppError::Validation("File is not a valid EPUB archive".to_string()))
    }

    /// Guess the cover entry from file names.
    fn find_cover_entry(archive: &ZipArchive<Cursor<&[u8]>>) -> Option<String> {
        archive
            .file_names()
            .filter(|name| {
                let lower = name.to_lowercase();
                lower.contains("cover")
                    && [".jpg", ".jpeg", ".png"]
                        .iter()
                        .any(|ext| lower.ends_with(ext))
            })
            .min_by_key(|name| name.len())
            .map(String::from)
    }
}

impl FormatHandler for EpubHandler {
    fn inspect(&self, data: &[u8]) -> Result<FileInfo> {
        let mut archive = Self::open(data)?;

        let mut mimetype = String::new();
        archive
            .by_name("mimetype")
            .map_err(|_| AppError::Validation("EPUB is missing its mimetype entry".to_string()))?
            .read_to_string(&mut mimetype)
            .map_err(|_| AppError::Validation("EPUB mimetype entry is unreadable".to_string()))?;

        if mimetype.trim() != EPUB_MIMETYPE {
            return Err(AppError::Validation(format!(
                "Unexpected EPUB mimetype '{}'",
                mimetype.trim()
            )));
        }

        if archive.by_name("META-INF/container.xml").is_err() {
            return Err(AppError::Validation(
                "EPUB is missing META-INF/container.xml".to_string(),
            ));
        }

        // Reflowable, so no fixed page count
        Ok(FileInfo { page_count: None })
    }

    fn extract_cover(&self, data: &[u8], max_size: usize) -> Result<Option<Vec<u8>>> {
        let mut archive = Self::open(data)?;

        let Some(name) = Self::find_cover_entry(&archive) else {
            return Ok(None);
        };

        let entry = archive.by_name(&name)?;
        if entry.size() > max_size as u64 {
            return Err(cover_too_large(max_size));
        }

        // The declared size can lie, so cap the read one byte past the limit
        let mut cover = Vec::new();
        entry.take(max_size as u64 + 1).read_to_end(&mut cover)?;
        if cover.len() > max_size {
            return Err(cover_too_large(max_size));
        }
        Ok(Some(cover))
    }
}
