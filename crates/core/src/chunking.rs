use crate::error::IngestError;
use crate::models::{Chunk, Page};

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;

/// Break candidates, coarsest first. Falls back to a plain character cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkParameters {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

/// Splits `text` into chunks of at most `chunk_size` characters where each
/// chunk starts exactly `chunk_overlap` characters before the previous one
/// ended. Lengths are counted in chars, not bytes.
///
/// The config must already be validated.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() {
        return chunks;
    }

    let mut start = 0;
    loop {
        if chars.len() - start <= config.chunk_size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let limit = start + config.chunk_size;
        let end = break_point(&chars, start, limit, start + config.chunk_overlap);
        chunks.push(chars[start..end].iter().collect());
        start = end - config.chunk_overlap;
    }

    chunks
}

/// Picks the chunk end in `(floor, limit]`. Ends strictly after `floor` so the
/// next chunk always starts past the current one.
fn break_point(chars: &[char], start: usize, limit: usize, floor: usize) -> usize {
    for separator in SEPARATORS {
        let separator: Vec<char> = separator.chars().collect();
        let mut end = limit;
        while end > floor && end >= start + separator.len() {
            if chars[end - separator.len()..end] == separator[..] {
                return end;
            }
            end -= 1;
        }
    }
    limit
}

pub fn split_pages(pages: &[Page], config: ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }

        let metadata = page.metadata();
        chunks.extend(split_text(&page.text, config).into_iter().map(|text| Chunk {
            text,
            metadata: metadata.clone(),
        }));
    }

    Ok(chunks)
}
