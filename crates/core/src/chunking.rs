use crate::error::PipelineError;
use crate::models::{Chunk, Document, PipelineOptions};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_chars == 0 {
            return Err(PipelineError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(PipelineError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

fn horizontal_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{a0}\u{0c}]+").expect("static regex is valid"))
}

/// Collapses runs of horizontal whitespace while keeping line breaks.
pub fn normalize_page_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = horizontal_space().replace_all(&unified, " ");
    collapsed
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// A piece of page text plus the number of leading characters it shares with its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub overlap_chars: usize,
}

/// Splits `text` into windows of at most `max_chars` characters.
///
/// A window ends after the last line break it contains, else after the last space,
/// else at the hard limit. Each following window starts `overlap_chars` before the
/// previous cut. Cuts are never placed inside the overlap region, so every window
/// advances by at least one character.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<TextSegment> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut overlap = 0usize;

    loop {
        let hard_end = (start + config.max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let floor = start + config.overlap_chars;
            find_cut(&chars[floor..hard_end], '\n')
                .or_else(|| find_cut(&chars[floor..hard_end], ' '))
                .map(|offset| floor + offset)
                .unwrap_or(hard_end)
        };

        segments.push(TextSegment {
            text: chars[start..end].iter().collect(),
            overlap_chars: overlap,
        });

        if end == chars.len() {
            break;
        }

        start = end - config.overlap_chars;
        overlap = config.overlap_chars;
    }

    segments
}

/// Position just after the last `separator` in `window`, if any.
fn find_cut(window: &[char], separator: char) -> Option<usize> {
    window
        .iter()
        .rposition(|ch| *ch == separator)
        .map(|position| position + 1)
}

/// Chunks every page of `document`; blank pages contribute nothing.
pub fn build_chunks(document: &Document, config: ChunkingConfig) -> Result<Vec<Chunk>, PipelineError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in &document.pages {
        let normalized = normalize_page_text(&page.text);
        for segment in split_text(&normalized, config) {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(
                    &document.fingerprint.document_id,
                    page.index,
                    cursor,
                    &segment.text,
                ),
                chunk_index: cursor,
                page_index: page.index,
                text: segment.text,
                overlap_chars: segment.overlap_chars,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
