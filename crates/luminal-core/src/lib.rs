//! # Luminal Core
//!
//! An attention-driven conversational memory engine. Instead of scoring
//! memories by recency or an access-count heuristic, it reads the
//! generator's own attention weights during a turn and uses them to decide,
//! token by token, what stays resident in the active context window and
//! what gets archived to the Semantic Index for later resurrection.
//!
//! ## Components
//!
//! - [`types`]: positions, turn ids, tokens, chunks — the core data model.
//! - [`store`]: SQLite-backed chunk and id-reservation persistence.
//! - [`embeddings`]: the `Embedder` trait and a deterministic local fallback.
//! - [`index`]: `SemanticIndex`, composing storage with an embedder.
//! - [`brightness`]: attention aggregation and per-token brightness scoring.
//! - [`working_set`]: the live, position-ordered token window and its pruning.
//! - [`resurrection`]: the budget-aware planner that restores archived context.
//! - [`reflection`]: the idle-timer trigger for synthetic self-summary turns.
//! - [`generator`]: the streaming inference-engine boundary.
//! - [`session`]: `SessionController`, the per-turn orchestration loop.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use luminal_core::{Config, HashEmbedder, SemanticIndex, SessionController, Storage};
//!
//! let index = SemanticIndex::new(Storage::open_in_memory()?, HashEmbedder::new());
//! let mut session = SessionController::new(index, my_generator, Config::default());
//! let outcome = session.handle_user_turn("What's the capital of France?").await?;
//! println!("{}", outcome.assistant_text);
//! ```

pub mod brightness;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod index;
pub mod reflection;
pub mod resurrection;
pub mod session;
pub mod store;
pub mod types;
pub mod working_set;

pub use brightness::{AttentionStep, BrightnessScorer};
pub use config::{
    AggregationPolicy, BrightnessConfig, Config, DecayMode, DistanceMode, EmbeddingConfig,
    ReflectionConfig, ResurrectionConfig, ScoreMode,
};
pub use embeddings::{cosine_similarity, dot_product, euclidean_distance, Embedder, Embedding, EmbeddingError, HashEmbedder};
pub use error::{Error, Result};
pub use generator::{
    GeneratedToken, GenerationRequest, GenerationStream, Generator, GeneratorError, TokenSpec,
};
pub use index::SemanticIndex;
pub use reflection::{ReflectionState, ReflectionTrigger};
pub use resurrection::{turn_pair_companions, ResurrectionInputs, ResurrectionOutcome, ResurrectionPlanner};
pub use session::{RenderedSentence, SessionController, TurnOutcome};
pub use store::{ExportedStore, Storage, StorageError};
pub use types::{Chunk, ChunkKey, CounterState, Position, Reservation, Role, Token, TurnId};
pub use working_set::{SentenceGroup, WorkingSet};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Chunk, ChunkKey, Config, Embedder, Embedding, Error, Generator, HashEmbedder, Position,
        Result, SemanticIndex, SessionController, Storage, StorageError, Token, TurnId, TurnOutcome,
    };
}
