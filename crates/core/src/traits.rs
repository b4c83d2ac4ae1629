use crate::llm::ChatMessage;
use crate::PipelineError;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model configuration; queries must use the same one as the index.
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::embedding(self.model_id(), "provider returned no vector"))
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn model_id(&self) -> String {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        (**self).embed_batch(texts).await
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> String;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, PipelineError>;
}
