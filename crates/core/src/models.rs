use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub title: String,
    pub checksum: String,
    pub page_count: u32,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub fingerprint: DocumentFingerprint,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.get(index as usize)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub page_index: u32,
    pub text: String,
    /// Number of leading characters repeated from the previous chunk on the same page.
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub cited_page_index: Option<u32>,
    pub sources: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn display_page(&self) -> Option<u32> {
        self.cited_page_index.map(|index| index + 1)
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions about a PDF document. \
Use only the numbered context passages below. If the answer is not in the context, say you don't know.";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub top_k: usize,
    pub history_turns: usize,
    pub embedding_batch_size: usize,
    pub condense_follow_ups: bool,
    pub min_citation_score: Option<f32>,
    pub system_prompt: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            top_k: 2,
            history_turns: 6,
            embedding_batch_size: 64,
            condense_follow_ups: false,
            min_citation_score: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
