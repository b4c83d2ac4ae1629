pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod excerpt;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod models;
pub mod session;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{build_chunks, normalize_page_text, split_text, ChunkingConfig, TextSegment};
pub use conversation::Conversation;
pub use embeddings::{
    CharacterNgramEmbedder, HuggingFaceEmbedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{PipelineError, Result};
pub use excerpt::{excerpt_pages, PageExcerpt};
pub use extractor::{extract_document, LopdfExtractor, PdfExtractor};
pub use index::ChunkIndex;
pub use llm::{ChatMessage, OpenAiChatModel, OpenAiConfig, Role};
pub use models::{
    Chunk, Document, DocumentFingerprint, Page, PipelineOptions, QueryResult, ScoredChunk, Turn,
};
pub use session::{ChatSession, LoadedDocument};
pub use synthesizer::AnswerSynthesizer;
pub use traits::{ChatModel, Embedder};
