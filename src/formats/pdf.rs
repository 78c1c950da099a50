use crate::error::{AppError, Result};
use crate::formats::{FileInfo, FormatHandler, cover_too_large};
use lopdf::{Document, Object};

/// Handler for PDF files.
pub struct PdfHandler;

impl PdfHandler {
    fn load(data: &[u8]) -> Result<Document> {
        Document::load_mem(data).map_err(|e| {
            tracing::debug!(error = %e, "Rejected PDF upload");
            AppError::Validation("File is not a valid PDF".to_string())
        })
    }

    /// Resolve a dictionary entry that may be inline or a reference.
    fn dictionary<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a lopdf::Dictionary> {
        match obj? {
            Object::Reference(r) => doc.get_dictionary(*r).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

impl FormatHandler for PdfHandler {
    fn inspect(&self, data: &[u8]) -> Result<FileInfo> {
        let doc = Self::load(data)?;
        let pages = doc.get_pages().len() as u32;

        if pages == 0 {
            return Err(AppError::Validation("PDF has no pages".to_string()));
        }

        Ok(FileInfo {
            page_count: Some(pages),
        })
    }

    fn extract_cover(&self, data: &[u8], max_size: usize) -> Result<Option<Vec<u8>>> {
        let doc = Document::load_mem(data).map_err(|e| AppError::Pdf(e.to_string()))?;

        let pages = doc.get_pages();
        let Some(&first_page_id) = pages.values().next() else {
            return Ok(None);
        };
        let Ok(page) = doc.get_dictionary(first_page_id) else {
            return Ok(None);
        };

        let Some(resources) = Self::dictionary(&doc, page.get(b"Resources").ok()) else {
            return Ok(None);
        };
        let Some(xobjects) = Self::dictionary(&doc, resources.get(b"XObject").ok()) else {
            return Ok(None);
        };

        // First JPEG or PNG image drawn on page one
        for (_name, obj) in xobjects.iter() {
            let Object::Reference(xobj_ref) = obj else {
                continue;
            };
            let Ok(Object::Stream(stream)) = doc.get_object(*xobj_ref) else {
                continue;
            };

            let is_image = matches!(
                stream.dict.get(b"Subtype"),
                Ok(Object::Name(n)) if n == b"Image"
            );
            if !is_image {
                continue;
            }

            // DCTDecode streams are JPEG as stored
            if stream.content.starts_with(&[0xFF, 0xD8, 0xFF]) {
                if stream.content.len() > max_size {
                    return Err(cover_too_large(max_size));
                }
                return Ok(Some(stream.content.clone()));
            }

            if let Ok(decoded) = stream.decompressed_content()
                && (decoded.starts_with(&[0xFF, 0xD8, 0xFF])
                    || decoded.starts_with(&[0x89, b'P', b'N', b'G']))
            {
                if decoded.len() > max_size {
                    return Err(cover_too_large(max_size));
                }
                return Ok(Some(decoded));
            }
        }

        Ok(None)
    }
}
