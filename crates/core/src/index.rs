//! Exact in-memory nearest-neighbour index over the chunks of one document.
//!
//! The index is immutable: a new document always gets a freshly built
//! [`ChunkIndex`], never an update of the previous one.

use crate::error::PipelineError;
use crate::models::{Chunk, ScoredChunk};

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
    norm: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    model_id: String,
    entries: Vec<IndexEntry>,
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

/// Returns 0.0 when either side has zero magnitude or the result is not a number.
pub fn cosine_similarity(left: &[f32], left_norm: f32, right: &[f32], right_norm: f32) -> f32 {
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right.iter()).map(|(a, b)| a * b).sum();
    let score = dot / (left_norm * right_norm);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}

impl ChunkIndex {
    pub fn build(
        model_id: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, PipelineError> {
        let model_id = model_id.into();
        if chunks.len() != vectors.len() {
            return Err(PipelineError::embedding(
                model_id,
                format!(
                    "embedding count {} doesn't match chunk count {}",
                    vectors.len(),
                    chunks.len()
                ),
            ));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                norm: l2_norm(&vector),
                chunk,
                vector,
            })
            .collect();

        Ok(Self { model_id, entries })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Top `k` chunks by descending cosine similarity; equal scores keep chunk order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let query_norm = l2_norm(query_vector);

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let score = cosine_similarity(query_vector, query_norm, &entry.vector, entry.norm);
                (position, score)
            })
            .collect::<Vec<_>>();

        scored.sort_by(|(left_pos, left), (right_pos, right)| {
            right.total_cmp(left).then(left_pos.cmp(right_pos))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect()
    }
}
