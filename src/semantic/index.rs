//! In-memory embedding store keyed by recipe id.
//!
//! Iteration is in ascending recipe id, which is also the candidate order
//! the ranker uses to break score ties.

use std::collections::BTreeMap;

use crate::recipes::RecipeId;

/// Recipe id -> embedding, all of one dimension.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    entries: BTreeMap<RecipeId, Vec<f32>>,
    dimensions: usize,
}

impl EmbeddingStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the embedding of one recipe.
    pub fn insert(&mut self, id: RecipeId, embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::NonFinite(id));
        }

        self.entries.insert(id, embedding);
        Ok(())
    }

    pub fn get(&self, id: RecipeId) -> Option<&[f32]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: RecipeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecipeId, &[f32])> {
        self.entries.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    /// Embeddings of `ids` in the order given; ids without an embedding are skipped.
    pub fn candidates<'a>(&'a self, ids: &[RecipeId]) -> Vec<(RecipeId, &'a [f32])> {
        ids.iter()
            .filter_map(|id| self.get(*id).map(|v| (*id, v)))
            .collect()
    }

    pub fn bulk_load(&mut self, entries: Vec<(RecipeId, Vec<f32>)>) -> Result<(), IndexError> {
        for (id, embedding) in entries {
            self.insert(id, embedding)?;
        }
        Ok(())
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding of recipe {0} contains NaN or infinite values")]
    NonFinite(RecipeId),

    #[error("Embedding model returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },
}
