use crate::error::PipelineError;
use crate::models::{Document, DocumentFingerprint, Page};
use chrono::Utc;
use lopdf::Document as PdfDocument;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub trait PdfExtractor {
    /// Returns one [`Page`] per PDF page, in page order, including blank pages.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, PipelineError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, PipelineError> {
        let document =
            PdfDocument::load_mem(bytes).map_err(|error| PipelineError::Extraction(error.to_string()))?;

        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        if page_numbers.is_empty() {
            return Err(PipelineError::Extraction(
                "pdf does not contain any pages".to_string(),
            ));
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        for (index, page_no) in page_numbers.into_iter().enumerate() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, %error, "page text could not be decoded; keeping it empty");
                    String::new()
                }
            };

            if text.trim().is_empty() {
                debug!(page = page_no, "page has no extractable text");
            }

            pages.push(Page {
                index: index as u32,
                text,
            });
        }

        Ok(pages)
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extracts every page and stamps the result with a content fingerprint.
pub fn extract_document<X>(extractor: &X, bytes: &[u8], title: &str) -> Result<Document, PipelineError>
where
    X: PdfExtractor + ?Sized,
{
    let pages = extractor.extract_pages(bytes)?;
    let checksum = digest_bytes(bytes);

    Ok(Document {
        fingerprint: DocumentFingerprint {
            document_id: checksum.clone(),
            title: title.to_string(),
            checksum,
            page_count: pages.len() as u32,
            ingested_at: Utc::now(),
        },
        pages,
    })
}
