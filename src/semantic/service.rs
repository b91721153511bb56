//! Semantic search over recipe names.
//!
//! Owns the embedding store for the lifetime of the application:
//! - `build` re-embeds every recipe name and replaces vectors.bin entirely
//! - `encode_query` and `rank` are read-only and may run concurrently
//!
//! The model handle is constructed by the caller and injected.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::recipes::RecipeId;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{EmbeddingStore, IndexError};
use crate::semantic::rank::{self, ScoredRecipe};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub struct SemanticSearch {
    model: Arc<dyn Embedder>,
    index: RwLock<EmbeddingStore>,
    storage: VectorStorage,
}

impl SemanticSearch {
    /// Open the vector file at `vectors_path` for `model`.
    ///
    /// A file written by another model, another dimension or an unknown
    /// format version is ignored and the index starts empty; the next
    /// `build` overwrites it.
    pub fn open(model: Arc<dyn Embedder>, vectors_path: PathBuf) -> Result<Self, SemanticSearchError> {
        let model_id = model.model_id_hash();
        let dimensions = model.dimensions();
        let storage = VectorStorage::new(vectors_path);

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(idx) => {
                    log::info!("Loaded {} vectors from storage", idx.len());
                    idx
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Model changed, creating fresh index");
                    EmbeddingStore::new(dimensions)
                }
                Err(VectorStorageError::DimensionMismatch { got, .. }) => {
                    log::warn!("Stored vectors have {} dimensions, creating fresh index", got);
                    EmbeddingStore::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!(
                        "Storage version {} unsupported, creating fresh index",
                        file_ver
                    );
                    EmbeddingStore::new(dimensions)
                }
                Err(e) => {
                    log::error!("Failed to load vectors: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("No existing index, starting fresh");
            EmbeddingStore::new(dimensions)
        };

        Ok(Self {
            model,
            index: RwLock::new(index),
            storage,
        })
    }

    /// Embed every recipe name without touching the live index.
    pub fn embed_names(&self, names: &[(RecipeId, String)]) -> Result<EmbeddingStore, SemanticSearchError> {
        let texts: Vec<String> = names.iter().map(|(_, name)| name.clone()).collect();
        let vectors = self.model.embed_batch(&texts)?;
        if vectors.len() != names.len() {
            return Err(IndexError::CountMismatch {
                expected: names.len(),
                got: vectors.len(),
            }
            .into());
        }

        let mut store = EmbeddingStore::new(self.model.dimensions());
        for ((id, _), vector) in names.iter().zip(vectors) {
            store.insert(*id, vector)?;
        }
        Ok(store)
    }

    /// Persist `store` and make it the live index. The previous vectors
    /// are discarded entirely.
    pub fn commit(&self, store: EmbeddingStore) -> Result<usize, SemanticSearchError> {
        let mut index = self
            .index
            .write()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        self.storage.save(&store, &self.model.model_id_hash())?;
        let count = store.len();
        *index = store;
        log::info!("indexed {} recipe names with '{}'", count, self.model.name());
        Ok(count)
    }

    /// Embed every name and replace the stored vectors.
    pub fn build(&self, names: &[(RecipeId, String)]) -> Result<usize, SemanticSearchError> {
        let store = self.embed_names(names)?;
        self.commit(store)
    }

    pub fn encode_query(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        Ok(self.model.embed(text)?)
    }

    /// Score the candidates that have an embedding, keeping `candidate_ids`
    /// order for ties.
    pub fn rank(
        &self,
        query: &[f32],
        candidate_ids: &[RecipeId],
        top_k: usize,
    ) -> Result<Vec<ScoredRecipe>, SemanticSearchError> {
        let index = self
            .index
            .read()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        let candidates = index.candidates(candidate_ids);
        if candidates.len() < candidate_ids.len() {
            log::debug!(
                "{} of {} candidates have no embedding",
                candidate_ids.len() - candidates.len(),
                candidate_ids.len()
            );
        }
        Ok(rank::rank(query, &candidates, top_k))
    }

    /// `encode_query` followed by `rank`.
    pub fn search(
        &self,
        query: &str,
        candidate_ids: &[RecipeId],
        top_k: usize,
    ) -> Result<Vec<ScoredRecipe>, SemanticSearchError> {
        let query_vector = self.encode_query(query)?;
        self.rank(&query_vector, candidate_ids, top_k)
    }

    pub fn indexed_count(&self) -> usize {
        self.index.read().map(|idx| idx.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn embedding(&self, id: RecipeId) -> Option<Vec<f32>> {
        self.index
            .read()
            .ok()
            .and_then(|idx| idx.get(id).map(<[f32]>::to_vec))
    }
}
