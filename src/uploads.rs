//! Storage of uploaded book files and cover images.

use crate::config::{BookFormat, UploadConfig};
use crate::db::Book;
use crate::error::{AppError, Result};
use crate::formats;
use crate::validate::sanitize_filename;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// A book file written to disk.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Detected format.
    pub format: BookFormat,
    /// Page count read from the file, if any.
    pub page_count: Option<u32>,
}

/// Upload directory layout: `books/`, `covers/` and a `thumbnails/` cache.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: UploadConfig,
}

impl FileStore {
    /// Create a store rooted at the configured upload directory.
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Create the upload directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.books_dir(), self.covers_dir(), self.thumbnails_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Maximum request body accepted for uploads.
    pub fn body_limit(&self) -> usize {
        // Multipart framing on top of the file itself
        self.config.max_file_size.max(self.config.max_cover_size) + 64 * 1024
    }

    /// Validate and store a book file.
    pub fn save_book_file(&self, book_id: &str, filename: &str, data: &[u8]) -> Result<StoredFile> {
        let filename = sanitize_filename(filename);
        let ext = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| AppError::Validation("File has no extension".to_string()))?;

        let format = BookFormat::from_extension(&ext)
            .filter(|_| self.config.extension_allowed(&ext))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "File type '.{}' not allowed; accepted: {}",
                    ext,
                    self.config.allowed_extensions.join(", ")
                ))
            })?;

        if data.is_empty() {
            return Err(AppError::Validation("File is empty".to_string()));
        }
        if data.len() > self.config.max_file_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.config.max_file_size
            )));
        }

        let info = formats::get_handler(format).inspect(data)?;

        // A book has one file; drop any previous upload in another format
        for other in [BookFormat::Epub, BookFormat::Pdf, BookFormat::Txt] {
            if other != format {
                remove_if_exists(&self.book_path(book_id, other));
            }
        }

        let path = self.book_path(book_id, format);
        write_atomic(&path, data)?;
        self.invalidate_thumbnail(book_id);

        tracing::info!(book_id = %book_id, format = ?format, size = data.len(), "Stored book file");
        Ok(StoredFile {
            path,
            size: data.len() as u64,
            format,
            page_count: info.page_count,
        })
    }

    /// Validate and store a cover image, returning its path.
    pub fn save_cover(&self, book_id: &str, data: &[u8]) -> Result<PathBuf> {
        if data.is_empty() {
            return Err(AppError::Validation("Cover image is empty".to_string()));
        }
        if data.len() > self.config.max_cover_size {
            return Err(AppError::PayloadTooLarge(format!(
                "Cover exceeds the {} byte limit",
                self.config.max_cover_size
            )));
        }

        let format = image::guess_format(data)
            .map_err(|_| AppError::Validation("Unrecognized image format".to_string()))?;
        let ext = match format {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            _ => {
                return Err(AppError::Validation(
                    "Cover must be JPEG, PNG or WebP".to_string(),
                ));
            }
        };

        image::load_from_memory_with_format(data, format)
            .map_err(|_| AppError::Validation("Cover image could not be decoded".to_string()))?;

        for other in ["jpg", "png", "webp"] {
            if other != ext {
                remove_if_exists(&self.covers_dir().join(format!("{}.{}", book_id, other)));
            }
        }

        let path = self.covers_dir().join(format!("{}.{}", book_id, ext));
        write_atomic(&path, data)?;
        self.invalidate_thumbnail(book_id);

        tracing::info!(book_id = %book_id, size = data.len(), "Stored cover image");
        Ok(path)
    }

    /// Cover image bytes and content type: the uploaded cover, else one
    /// embedded in the book file.
    pub fn cover(&self, book: &Book) -> Result<Option<(Vec<u8>, &'static str)>> {
        if let Some(path) = &book.cover_path {
            let data = std::fs::read(path)?;
            let mime = match image::guess_format(&data) {
                Ok(ImageFormat::Png) => "image/png",
                Ok(ImageFormat::WebP) => "image/webp",
                _ => "image/jpeg",
            };
            return Ok(Some((data, mime)));
        }

        let (Some(path), Some(format)) = (
            book.file_path.as_ref(),
            book.file_type.as_deref().and_then(BookFormat::from_extension),
        ) else {
            return Ok(None);
        };

        let data = std::fs::read(path)?;
        let cover =
            formats::get_handler(format).extract_cover(&data, self.config.max_cover_size)?;
        Ok(cover.map(|data| {
            let mime = if data.starts_with(&[0x89, b'P', b'N', b'G']) {
                "image/png"
            } else {
                "image/jpeg"
            };
            (data, mime)
        }))
    }

    /// PNG thumbnail of the book's cover, cached on disk.
    pub fn thumbnail(&self, book: &Book) -> Result<Option<Vec<u8>>> {
        let cache_path = self.thumbnail_path(&book.id);

        // Try cache first
        if cache_path.exists()
            && let Ok(data) = std::fs::read(&cache_path)
        {
            return Ok(Some(data));
        }

        let Some((cover, _)) = self.cover(book)? else {
            return Ok(None);
        };

        let size = self.config.thumbnail_size;
        let thumb = image::load_from_memory(&cover)?.thumbnail(size, size * 2);

        let mut data = Vec::new();
        thumb.write_to(&mut std::io::Cursor::new(&mut data), ImageFormat::Png)?;

        // Save to cache
        if let Some(parent) = cache_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&cache_path, &data) {
            tracing::warn!(book_id = %book.id, error = %e, "Failed to cache thumbnail");
        }

        Ok(Some(data))
    }

    /// Remove every stored file of a book. Failures are logged, not returned.
    pub fn remove_book_files(&self, book: &Book) {
        for path in [book.file_path.as_deref(), book.cover_path.as_deref()]
            .into_iter()
            .flatten()
        {
            remove_if_exists(Path::new(path));
        }
        self.invalidate_thumbnail(&book.id);
    }

    fn books_dir(&self) -> PathBuf {
        self.config.dir.join("books")
    }

    fn covers_dir(&self) -> PathBuf {
        self.config.dir.join("covers")
    }

    fn thumbnails_dir(&self) -> PathBuf {
        self.config.dir.join("thumbnails")
    }

    fn book_path(&self, book_id: &str, format: BookFormat) -> PathBuf {
        self.books_dir()
            .join(format!("{}.{}", book_id, format.extension()))
    }

    fn thumbnail_path(&self, book_id: &str) -> PathBuf {
        self.thumbnails_dir().join(format!("{}.png", book_id))
    }

    fn invalidate_thumbnail(&self, book_id: &str) {
        remove_if_exists(&self.thumbnail_path(book_id));
    }
}

/// Write via a temporary file so readers never see a partial upload.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("part");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}
