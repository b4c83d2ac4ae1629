use crate::error::PipelineError;
use crate::models::Turn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Append-only, chronological log of question/answer turns for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    #[serde(default)]
    document_id: Option<String>,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            turns: Vec::new(),
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn append(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        asked_at: DateTime<Utc>,
    ) {
        self.turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
            asked_at,
        });
    }

    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Question/answer pairs without timestamps, oldest first.
    pub fn as_dialogue_context(&self) -> Vec<(String, String)> {
        self.turns
            .iter()
            .map(|turn| (turn.question.clone(), turn.answer.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn save_json(&self, path: &Path) -> Result<(), PipelineError> {
        let encoded = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
