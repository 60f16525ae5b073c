use crate::error::IngestError;
use crate::models::Page;
use lopdf::Document;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor: Send + Sync {
    /// Returns one page per physical page of the document, in document order.
    /// `source_name` ends up in every page's metadata.
    fn extract_pages(&self, path: &Path, source_name: &str) -> Result<Vec<Page>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path, source_name: &str) -> Result<Vec<Page>, IngestError> {
        let document = Document::load(path).map_err(|error| {
            IngestError::UnreadableDocument(format!("{}: {error}", path.display()))
        })?;
        let normalizer = PageTextNormalizer::new()?;

        let mut pages = Vec::new();
        // get_pages is a BTreeMap keyed by 1-based page number
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => normalizer.normalize(&text),
                Err(error) => {
                    warn!(page = page_no, %error, "page text extraction failed, keeping empty page");
                    String::new()
                }
            };

            pages.push(Page {
                text,
                page_number: page_no,
                source_path: source_name.to_string(),
            });
        }

        if pages.is_empty() {
            return Err(IngestError::UnreadableDocument(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(IngestError::UnreadableDocument(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        debug!(pages = pages.len(), source = source_name, "extracted pdf pages");
        Ok(pages)
    }
}

pub fn extract_pages(path: &Path, source_name: &str) -> Result<Vec<Page>, IngestError> {
    LopdfExtractor.extract_pages(path, source_name)
}

struct PageTextNormalizer {
    trailing_space: Regex,
    blank_runs: Regex,
}

impl PageTextNormalizer {
    fn new() -> Result<Self, IngestError> {
        Ok(Self {
            trailing_space: Regex::new(r"[ \t]+\n")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    fn normalize(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let trimmed = self.trailing_space.replace_all(&unified, "\n");
        let collapsed = self.blank_runs.replace_all(&trimmed, "\n\n");
        collapsed.trim().to_string()
    }
}
