//! Generator interface: the inference engine is an external
//! collaborator. This module defines only the boundary — tokenization,
//! a streaming generation call carrying per-token attention, the
//! context limit, and an optional speculative preview.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::brightness::AttentionStep;

#[derive(Debug, Clone)]
pub struct TokenSpec {
    pub token_id: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub context_tokens: Vec<TokenSpec>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

/// One item of a generation stream: an emitted token plus the attention
/// tensor computed for that step.
#[derive(Debug, Clone)]
pub struct GeneratedToken {
    pub token_id: u32,
    pub text: String,
    pub attention: AttentionStep,
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum GeneratorError {
    #[error("generator failed mid-stream: {0}")]
    StreamFailed(String),
    #[error("tokenization failed: {0}")]
    TokenizeFailed(String),
}

pub type GenerationStream = BoxStream<'static, Result<GeneratedToken, GeneratorError>>;

/// The inference engine boundary. Implementations may wrap a
/// remote model server; cancellation is expressed by dropping the stream.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpec>, GeneratorError>;

    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream, GeneratorError>;

    fn get_context_limit(&self) -> usize;

    /// Speculative preview given a just-tokenized user message, without
    /// committing. `None` means the generator doesn't support previewing;
    /// the Planner then falls back to the raw user text for its query.
    async fn preview(&self, _context_tokens: &[TokenSpec], _max_tokens: usize) -> Option<String> {
        None
    }
}
