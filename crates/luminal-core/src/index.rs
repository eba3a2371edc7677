//! Semantic Index: single authority for chunk storage, id allocation, and
//! similarity search, composing a `Storage` with an `Embedder`.

use std::collections::HashSet;

use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::store::Storage;
use crate::types::{Chunk, ChunkKey, Position, Reservation, Token};

pub struct SemanticIndex<E: Embedder> {
    storage: Storage,
    embedder: E,
}

impl<E: Embedder> SemanticIndex<E> {
    pub fn new(storage: Storage, embedder: E) -> Self {
        Self { storage, embedder }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Atomically allocate a turn-id pair and a disjoint position range.
    pub fn reserve_ids(&self, n: u128) -> Result<Reservation> {
        Ok(self.storage.reserve_ids(n)?)
    }

    /// Persist a chunk, embedding its text first if it doesn't already
    /// carry one. An embedding failure is logged and the chunk is still
    /// written with `embedding: None` — it simply stays unsearchable until
    /// a later `re_embed_all` sweep.
    pub fn write_chunk(&self, mut chunk: Chunk) -> Result<Chunk> {
        if chunk.embedding.is_none() {
            match self.embedder.embed(&chunk.text) {
                Ok(embedding) => {
                    chunk.embedding = Some(embedding.vector);
                    chunk.model = Some(self.embedder.model_tag().to_string());
                }
                Err(e) => {
                    tracing::warn!(chunk = %chunk.key, error = %e, "embedding failed, persisting without embedding");
                }
            }
        }
        self.storage.write_chunk(&chunk)?;
        Ok(chunk)
    }

    /// Like `write_chunk`, but embeds `embed_text` instead of `chunk.text`
    /// when no embedding is already present. Used when the embedding input
    /// should carry turn-pair context the stored chunk text doesn't.
    pub fn write_chunk_with_context(&self, mut chunk: Chunk, embed_text: &str) -> Result<Chunk> {
        if chunk.embedding.is_none() {
            match self.embedder.embed(embed_text) {
                Ok(embedding) => {
                    chunk.embedding = Some(embedding.vector);
                    chunk.model = Some(self.embedder.model_tag().to_string());
                }
                Err(e) => {
                    tracing::warn!(chunk = %chunk.key, error = %e, "embedding failed, persisting without embedding");
                }
            }
        }
        self.storage.write_chunk(&chunk)?;
        Ok(chunk)
    }

    /// Top-`k` chunks by cosine similarity to `text`, descending, ties
    /// broken by more recent timestamp. Deleted or unembedded chunks are
    /// never candidates.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<(Chunk, f32)>> {
        let query_embedding = self.embedder.embed(text)?;
        let candidates = self.storage.list_searchable_chunks()?;

        let mut scored: Vec<(Chunk, f32)> = candidates
            .into_iter()
            .filter_map(|chunk| {
                let score = cosine_similarity(&query_embedding.vector, chunk.embedding.as_ref()?);
                Some((chunk, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.timestamp.cmp(&a.0.timestamp))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Idempotent: unsets the embedding and marks deleted.
    pub fn soft_delete(&self, key: ChunkKey) -> Result<()> {
        match self.storage.soft_delete(key) {
            Ok(()) => Ok(()),
            Err(crate::store::StorageError::NotFound(_)) => {
                tracing::warn!(%key, "soft_delete of unknown chunk ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-embeds the chunk's text and clears `deleted`.
    pub fn undelete(&self, key: ChunkKey) -> Result<()> {
        self.storage.undelete(key)?;
        if let Some(chunk) = self.storage.get_chunk(key)? {
            if let Ok(embedding) = self.embedder.embed(&chunk.text) {
                self.storage
                    .update_embedding(key, &embedding.vector, self.embedder.model_tag())?;
            }
        }
        Ok(())
    }

    /// Re-embed every non-deleted, previously-embedded chunk under a new
    /// model tag. Safe to interleave with reads; not with another
    /// concurrent `re_embed_all`.
    pub fn re_embed_all(&self, model_tag: &str) -> Result<usize> {
        let chunks = self.storage.list_searchable_chunks()?;
        let mut updated = 0;
        for chunk in chunks {
            match self.embedder.embed(&chunk.text) {
                Ok(embedding) => {
                    self.storage.update_embedding(chunk.key, &embedding.vector, model_tag)?;
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(chunk = %chunk.key, error = %e, "re-embed failed, leaving prior embedding");
                }
            }
        }
        Ok(updated)
    }

    /// Recover tokens for window restoration: chunks whose range overlaps
    /// `[min(positions), max(positions)]`, filtered down to exactly the
    /// requested positions, sorted ascending.
    pub fn tokens_by_positions(&self, positions: &[Position]) -> Result<Vec<Token>> {
        let Some(min) = positions.iter().min().copied() else {
            return Ok(Vec::new());
        };
        let max = positions.iter().max().copied().unwrap_or(min);
        let wanted: HashSet<Position> = positions.iter().copied().collect();

        let chunks = self.storage.chunks_overlapping_range(min, max)?;
        let mut tokens: Vec<Token> = chunks
            .into_iter()
            .flat_map(|c| c.tokens)
            .filter(|t| wanted.contains(&t.position))
            .collect();
        tokens.sort_by_key(|t| t.position);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::types::{Role, TurnId};
    use chrono::Utc;

    fn index() -> SemanticIndex<HashEmbedder> {
        SemanticIndex::new(Storage::open_in_memory().unwrap(), HashEmbedder::new())
    }

    fn chunk(turn: u128, text: &str) -> Chunk {
        let key = ChunkKey { turn_id: TurnId(turn), sentence_id: 0, role: Role::User };
        let token = Token::new(Position(turn * 10), 1, text, TurnId(turn), 0, Role::User, 0.0);
        Chunk::from_tokens(key, vec![token], Utc::now())
    }

    #[test]
    fn write_chunk_embeds_when_missing() {
        let idx = index();
        let written = idx.write_chunk(chunk(1, "remind me about photosynthesis")).unwrap();
        assert!(written.embedding.is_some());
    }

    #[test]
    fn query_ranks_by_similarity_and_skips_deleted() {
        let idx = index();
        let a = idx.write_chunk(chunk(1, "photosynthesis explanation")).unwrap();
        idx.write_chunk(chunk(2, "chocolate cake recipe")).unwrap();

        let results = idx.query("remind me about photosynthesis", 5).unwrap();
        assert_eq!(results[0].0.key, a.key);

        idx.soft_delete(a.key).unwrap();
        let results = idx.query("remind me about photosynthesis", 5).unwrap();
        assert!(results.iter().all(|(c, _)| c.key != a.key));
    }

    #[test]
    fn soft_delete_unknown_chunk_is_a_warned_noop() {
        let idx = index();
        let key = ChunkKey { turn_id: TurnId(404), sentence_id: 0, role: Role::User };
        assert!(idx.soft_delete(key).is_ok());
    }

    #[test]
    fn tokens_by_positions_filters_to_requested_set() {
        let idx = index();
        idx.write_chunk(chunk(1, "alpha")).unwrap();
        idx.write_chunk(chunk(2, "beta")).unwrap();

        let tokens = idx.tokens_by_positions(&[Position(10)]).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].position, Position(10));
    }

    #[test]
    fn re_embed_all_updates_model_tag() {
        let idx = index();
        idx.write_chunk(chunk(1, "alpha")).unwrap();
        let updated = idx.re_embed_all("hash-embedder-v2-384d").unwrap();
        assert_eq!(updated, 1);
    }
}
