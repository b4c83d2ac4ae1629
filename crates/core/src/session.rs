use crate::chunking::{build_chunks, ChunkingConfig};
use crate::conversation::Conversation;
use crate::extractor::{extract_document, LopdfExtractor, PdfExtractor};
use crate::index::ChunkIndex;
use crate::models::{Document, PipelineOptions, QueryResult};
use crate::synthesizer::AnswerSynthesizer;
use crate::traits::{ChatModel, Embedder};
use crate::PipelineError;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Everything derived from one processed PDF. Replaced as a unit on re-upload.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub index: ChunkIndex,
    pub conversation: Conversation,
}

pub struct ChatSession<E, M, X = LopdfExtractor> {
    embedder: E,
    chat: M,
    extractor: X,
    options: PipelineOptions,
    loaded: Option<LoadedDocument>,
}

impl<E, M> ChatSession<E, M, LopdfExtractor>
where
    E: Embedder,
    M: ChatModel,
{
    pub fn new(embedder: E, chat: M, options: PipelineOptions) -> Self {
        Self::with_extractor(embedder, chat, LopdfExtractor, options)
    }
}

impl<E, M, X> ChatSession<E, M, X>
where
    E: Embedder,
    M: ChatModel,
    X: PdfExtractor + Clone + Send + 'static,
{
    pub fn with_extractor(embedder: E, chat: M, extractor: X, options: PipelineOptions) -> Self {
        Self {
            embedder,
            chat,
            extractor,
            options,
            loaded: None,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn document(&self) -> Option<&Document> {
        self.loaded.as_ref().map(|loaded| &loaded.document)
    }

    pub fn index(&self) -> Option<&ChunkIndex> {
        self.loaded.as_ref().map(|loaded| &loaded.index)
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.loaded.as_ref().map(|loaded| &loaded.conversation)
    }

    /// Extracts, chunks and embeds `bytes`, then swaps in the new document with an
    /// empty conversation. On any error the previous document stays active.
    pub async fn process_document(
        &mut self,
        bytes: Vec<u8>,
        title: &str,
    ) -> Result<&Document, PipelineError> {
        let config = ChunkingConfig::from(&self.options);
        config.validate()?;

        let extractor = self.extractor.clone();
        let owned_title = title.to_string();
        let document = tokio::task::spawn_blocking(move || {
            extract_document(&extractor, &bytes, &owned_title)
        })
        .await
        .map_err(|error| PipelineError::Extraction(format!("extraction task failed: {error}")))??;

        let chunks = build_chunks(&document, config)?;
        debug_assert!(chunks
            .iter()
            .all(|chunk| chunk.page_index < document.page_count()));

        let batch_size = self.options.embedding_batch_size.max(1);
        let mut vectors = Vec::with_capacity(chunks.len());
        {
            let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
            for batch in texts.chunks(batch_size) {
                let embedded = self.embedder.embed_batch(batch).await?;
                if embedded.len() != batch.len() {
                    return Err(PipelineError::embedding(
                        self.embedder.model_id(),
                        format!("expected {} vectors, got {}", batch.len(), embedded.len()),
                    ));
                }
                debug!(batch = batch.len(), embedded_so_far = vectors.len() + embedded.len(), "embedded chunk batch");
                vectors.extend(embedded);
            }
        }

        let chunk_count = chunks.len();
        let index = ChunkIndex::build(self.embedder.model_id(), chunks, vectors)?;

        info!(
            document_id = %document.fingerprint.document_id,
            title = %document.fingerprint.title,
            pages = document.page_count(),
            chunks = chunk_count,
            embedder = %self.embedder.model_id(),
            "document processed"
        );

        let conversation = Conversation::for_document(document.fingerprint.document_id.clone());
        let loaded = self.loaded.insert(LoadedDocument {
            document,
            index,
            conversation,
        });
        Ok(&loaded.document)
    }

    /// Fails with [`PipelineError::IndexNotReady`] before touching any provider when
    /// no document has been processed. A failed answer leaves the conversation as it was.
    pub async fn ask(&mut self, question: &str) -> Result<QueryResult, PipelineError> {
        let loaded = self.loaded.as_mut().ok_or(PipelineError::IndexNotReady)?;

        if question.trim().is_empty() {
            return Err(PipelineError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let dialogue = loaded.conversation.as_dialogue_context();
        let result = AnswerSynthesizer::new(&self.embedder, &self.chat, &self.options)
            .answer(question, &dialogue, &loaded.index)
            .await?;

        loaded
            .conversation
            .append(question, result.answer.clone(), Utc::now());
        info!(
            turn = loaded.conversation.len(),
            cited_page = result.display_page(),
            "question answered"
        );

        Ok(result)
    }

    /// Replaces the active document's history with one saved for the same document.
    pub fn restore_conversation(&mut self, conversation: Conversation) -> Result<(), PipelineError> {
        let loaded = self.loaded.as_mut().ok_or(PipelineError::IndexNotReady)?;
        let active_id = loaded.document.fingerprint.document_id.as_str();

        if conversation.document_id() != Some(active_id) {
            warn!(
                history_document = conversation.document_id().unwrap_or("<unknown>"),
                active_document = active_id,
                "refusing to restore history saved for another document"
            );
            return Err(PipelineError::InvalidArgument(format!(
                "conversation belongs to document {}, not the loaded document {}",
                conversation.document_id().unwrap_or("<unknown>"),
                active_id
            )));
        }

        loaded.conversation = conversation;
        Ok(())
    }
}
