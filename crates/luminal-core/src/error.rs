//! Crate-level error type, bridging the per-component error enums.
//!
//! Each external boundary (store, embedder, generator) gets its own
//! `#[non_exhaustive] thiserror::Error` enum; `Error` wraps them with
//! `#[from]` so `SessionController` can propagate with `?` without manual
//! matching.

use crate::embeddings::EmbeddingError;
use crate::store::StorageError;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StorageError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("generator error: {0}")]
    Generator(String),

    #[error("id reservation failed after {attempts} attempts")]
    ReservationFailed { attempts: u32 },

    #[error("invariant violated: {0}")]
    Invariant(String),
}
