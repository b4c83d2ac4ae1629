use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf extraction failed: {0}")]
    Extraction(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed ({provider}): {details}")]
    Embedding { provider: String, details: String },

    #[error("no document has been processed yet; upload and process a PDF first")]
    IndexNotReady,

    #[error("answer synthesis failed ({provider}): {details}")]
    Synthesis { provider: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl PipelineError {
    pub fn embedding(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            details: details.into(),
        }
    }

    pub fn synthesis(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Synthesis {
            provider: provider.into(),
            details: details.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
