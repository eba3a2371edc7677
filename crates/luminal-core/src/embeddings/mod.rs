//! Embedder contract and similarity primitives.
//!
//! The embedding model itself is an external collaborator: an opaque,
//! possibly-async `text -> unit-norm vector of fixed dimension D` function.
//! This module defines the trait boundary plus a local, dependency-light
//! default implementation so the crate is runnable without a model
//! download; a production deployment swaps in a real model behind the
//! same trait.

mod local;

pub use local::{cosine_similarity, dot_product, euclidean_distance, Embedding, HashEmbedder};

use std::fmt;

/// Embedding error types (non-exhaustive: more failure modes may be added
/// as real model backends are plugged in).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    ModelInit(String),
    EmbeddingFailed(String),
    InvalidInput(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::ModelInit(e) => write!(f, "model initialization failed: {}", e),
            EmbeddingError::EmbeddingFailed(e) => write!(f, "embedding generation failed: {}", e),
            EmbeddingError::InvalidInput(e) => write!(f, "invalid input: {}", e),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// `text -> unit-norm vector of fixed dimension D`, deterministic for a
/// given model tag. Implementations may be backed by an async model
/// server; this trait's synchronous signature is the boundary the rest of
/// the engine calls through — an async backend wraps its own
/// blocking/runtime handoff internally behind a sync `embed`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    fn dimensions(&self) -> usize;

    fn model_tag(&self) -> &str;

    /// Batch embedding; default implementation just loops `embed`.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
