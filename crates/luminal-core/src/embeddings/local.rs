//! Local deterministic embedding implementation.
//!
//! `HashEmbedder` is a feature-hashed bag-of-words embedder: each whitespace
//! token is hashed into one of `D` buckets, bucket counts are L2-normalized.
//! It is not semantically strong, but it is deterministic, dependency-light,
//! and satisfies the `Embedder` contract exactly (unit-norm, fixed
//! dimension, deterministic for a given model tag). Swapping in a real
//! model means writing a new `Embedder` impl; nothing above this layer
//! changes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{Embedder, EmbeddingError};

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Maximum input length in bytes before truncation.
pub const MAX_TEXT_LENGTH: usize = 8192;

/// A unit-norm embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.vector, &other.vector)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

/// Deterministic, local, hash-bucketed embedder.
pub struct HashEmbedder {
    dimensions: usize,
    model_tag: String,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_tag: format!("hash-embedder-v1-{}d", dimensions),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }

        let text = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };

        let mut buckets = vec![0.0f32; self.dimensions];
        let mut saw_token = false;
        for token in text.split_whitespace() {
            saw_token = true;
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish() as usize;
            let bucket = h % self.dimensions;
            // Sign hashing (second hash bit) reduces bucket-collision bias,
            // a standard feature-hashing trick.
            let sign = if (h >> 1) & 1 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }

        if !saw_token {
            return Err(EmbeddingError::InvalidInput(
                "text contained no tokens".into(),
            ));
        }

        let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut buckets {
                *x /= norm;
            }
        }

        Ok(Embedding::new(buckets))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_tag(&self) -> &str {
        &self.model_tag
    }
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn hash_embedder_produces_unit_vector() {
        let embedder = HashEmbedder::new();
        let emb = embedder.embed("the quick brown fox jumps").unwrap();
        let norm: f32 = emb.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
        assert_eq!(emb.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("remind me about X").unwrap();
        let b = embedder.embed("remind me about X").unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[test]
    fn hash_embedder_similar_text_scores_higher_than_dissimilar() {
        let embedder = HashEmbedder::new();
        let query = embedder.embed("remind me about photosynthesis").unwrap();
        let similar = embedder
            .embed("what do you remember about photosynthesis")
            .unwrap();
        let dissimilar = embedder.embed("recipe for chocolate cake").unwrap();

        let sim_score = query.cosine_similarity(&similar);
        let dis_score = query.cosine_similarity(&dissimilar);
        assert!(sim_score > dis_score);
    }

    #[test]
    fn hash_embedder_rejects_empty_input() {
        let embedder = HashEmbedder::new();
        assert!(embedder.embed("").is_err());
    }

    #[test]
    fn embedding_byte_round_trip() {
        let original = Embedding::new(vec![1.5, -2.5, 3.5]);
        let bytes = original.to_bytes();
        let restored = Embedding::from_bytes(&bytes).unwrap();
        assert_eq!(original.vector, restored.vector);
    }
}
