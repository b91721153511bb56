//! Semantic search over recipe names.
//!
//! - `embeddings`: the `Embedder` seam and its fastembed implementation
//! - `index`: in-memory embedding store keyed by recipe id
//! - `rank`: cosine similarity top-K ranking
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `service`: build, encode and rank behind one handle

pub mod embeddings;
mod index;
pub mod rank;
mod service;
mod storage;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use service::{SemanticSearch, SemanticSearchError};
pub use storage::{VectorStorage, VectorStorageError};

/// Default embedding model name. Multilingual, so Korean recipe names embed well.
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Default number of results returned by name search
pub const DEFAULT_TOP_K: usize = 15;
