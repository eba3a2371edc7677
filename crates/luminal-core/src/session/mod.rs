//! Session Controller: the per-turn orchestration loop tying
//! the Semantic Index, Working Set, Resurrection Planner, Brightness
//! Scorer, Reflection Trigger, and Generator together.

use chrono::Utc;
use futures::StreamExt;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::generator::{GenerationRequest, Generator, TokenSpec};
use crate::index::SemanticIndex;
use crate::reflection::ReflectionTrigger;
use crate::resurrection::{turn_pair_companions, ResurrectionInputs, ResurrectionOutcome, ResurrectionPlanner};
use crate::types::{Chunk, ChunkKey, Reservation, Role, Token};
use crate::working_set::WorkingSet;

const RESERVE_MAX_ATTEMPTS: u32 = 5;
const RESERVE_BASE_BACKOFF_MS: u64 = 10;

/// What one `handle_user_turn` call produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reservation: Reservation,
    pub resurrection: ResurrectionOutcome,
    pub assistant_text: String,
    pub written_chunks: Vec<ChunkKey>,
}

/// A read-only snapshot of one sentence in the current Working Set, as
/// handed to a caller rendering the live conversation. `deleted` is always
/// `false` here: a deleted sentence is removed from the list by `delete`
/// rather than flagged in place.
#[derive(Debug, Clone)]
pub struct RenderedSentence {
    pub turn_id: crate::types::TurnId,
    pub sentence_id: u32,
    pub role: Role,
    pub text: String,
    pub peak_brightness: f64,
    pub deleted: bool,
}

pub struct SessionController<E: Embedder, G: Generator> {
    index: SemanticIndex<E>,
    generator: G,
    working_set: WorkingSet,
    planner: ResurrectionPlanner,
    reflection: ReflectionTrigger,
    config: Config,
}

impl<E: Embedder, G: Generator> SessionController<E, G> {
    pub fn new(index: SemanticIndex<E>, generator: G, config: Config) -> Self {
        let scorer = crate::brightness::BrightnessScorer::new(config.brightness.clone());
        Self {
            index,
            generator,
            working_set: WorkingSet::new(scorer),
            planner: ResurrectionPlanner::new(config.resurrection),
            reflection: ReflectionTrigger::new(config.reflection.clone()),
            config,
        }
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn index(&self) -> &SemanticIndex<E> {
        &self.index
    }

    /// Reopen a window: recover tokens for `positions` from storage and
    /// splice them back in verbatim.
    pub fn restore_window(&mut self, positions: &[crate::types::Position]) -> Result<()> {
        let tokens = self.index.tokens_by_positions(positions)?;
        self.working_set.restore(tokens);
        Ok(())
    }

    /// The Renderer's read-only sentence-list snapshot.
    pub fn render_sentences(&self) -> Vec<RenderedSentence> {
        self.working_set
            .sentences()
            .into_iter()
            .map(|group| RenderedSentence {
                turn_id: group.key.turn_id,
                sentence_id: group.key.sentence_id,
                role: group.key.role,
                text: group.tokens.iter().map(|t| t.text.as_str()).collect(),
                peak_brightness: group.peak,
                deleted: false,
            })
            .collect()
    }

    /// The Renderer's `on_delete` callback: removes `key` from the active
    /// Working Set and soft-deletes its persisted chunk.
    pub fn delete(&mut self, key: ChunkKey) -> Result<()> {
        self.working_set.remove_sentence(key);
        self.index.soft_delete(key)
    }

    /// Reserve `n` ids, retrying with exponential backoff on failure.
    async fn reserve_with_backoff(&self, n: u128) -> Result<Reservation> {
        let mut attempt = 0u32;
        let mut backoff_ms = RESERVE_BASE_BACKOFF_MS;
        loop {
            attempt += 1;
            match self.index.reserve_ids(n) {
                Ok(reservation) => return Ok(reservation),
                Err(e) if attempt >= RESERVE_MAX_ATTEMPTS => {
                    tracing::warn!(error = %e, attempts = attempt, "id reservation exhausted retries");
                    return Err(Error::ReservationFailed { attempts: attempt });
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "id reservation failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Run the full per-turn protocol for one user message.
    pub async fn handle_user_turn(&mut self, user_text: &str) -> Result<TurnOutcome> {
        self.reflection.on_user_message(Utc::now());

        let user_specs = self
            .generator
            .tokenize(user_text)
            .await
            .map_err(|e| Error::Generator(e.to_string()))?;

        // reserve = U_exact + G_max + O + safety, so the admitted user text
        // and the full assistant generation both fit inside one reservation.
        let reserve_n = (user_specs.len()
            + self.config.max_generation
            + self.config.overhead
            + self.config.safety_margin) as u128;
        let reservation = self.reserve_with_backoff(reserve_n).await?;

        let mut cursor = reservation.p_start;
        let mut user_tokens = Vec::with_capacity(user_specs.len());
        for spec in &user_specs {
            Self::check_in_bounds(cursor, &reservation)?;
            user_tokens.push(Token::new(cursor, spec.token_id, spec.text.clone(), reservation.t_user, 0, Role::User, 0.0));
            cursor = cursor.succ();
        }
        let user_token_count = user_tokens.len();
        self.working_set.admit(user_tokens)?;

        let inputs = ResurrectionInputs {
            active_tokens: self.working_set.active_tokens().len(),
            user_tokens_just_added: user_token_count,
            context_limit: self.generator.get_context_limit(),
            reserved_user_tokens: user_token_count,
            max_generation: self.config.max_generation,
            overhead: self.config.overhead,
        };
        let query_text = self
            .generator
            .preview(&user_specs, self.config.max_generation)
            .await
            .unwrap_or_else(|| user_text.to_string());
        let resurrection = self
            .planner
            .plan(&self.index, &mut self.working_set, &query_text, inputs)?;

        let (assistant_text, next_cursor) = self
            .stream_assistant_reply(reservation.t_assistant, cursor, reservation)
            .await?;
        let _ = next_cursor;

        if self.working_set.active_tokens().len() > self.config.context_limit {
            self.working_set.prune_to(self.config.context_limit);
        }

        let written_chunks = self.flush_closed_sentences(&[reservation.t_user, reservation.t_assistant])?;

        Ok(TurnOutcome {
            reservation,
            resurrection,
            assistant_text,
            written_chunks,
        })
    }

    /// Check the Reflection Trigger and, if it fires, run a synthetic
    /// system-prompted turn whose output is persisted the same way a
    /// normal assistant turn is.
    pub async fn maybe_reflect(&mut self) -> Result<Option<TurnOutcome>> {
        if !self.reflection.poll(Utc::now()) {
            return Ok(None);
        }

        let prompt = self.reflection.prompt().to_string();
        let prompt_specs = self
            .generator
            .tokenize(&prompt)
            .await
            .map_err(|e| Error::Generator(e.to_string()))?;

        let reserve_n = (prompt_specs.len()
            + self.reflection.max_tokens() as usize
            + self.config.overhead
            + self.config.safety_margin) as u128;
        let reservation = self.reserve_with_backoff(reserve_n).await?;

        let mut cursor = reservation.p_start;
        let mut system_tokens = Vec::with_capacity(prompt_specs.len());
        for spec in &prompt_specs {
            Self::check_in_bounds(cursor, &reservation)?;
            system_tokens.push(Token::new(cursor, spec.token_id, spec.text.clone(), reservation.t_user, 0, Role::System, 0.0));
            cursor = cursor.succ();
        }
        self.working_set.admit(system_tokens)?;

        let (assistant_text, _) = self
            .stream_assistant_reply(reservation.t_assistant, cursor, reservation)
            .await?;

        let written_chunks = self.flush_closed_sentences(&[reservation.t_user, reservation.t_assistant])?;
        self.reflection.complete_firing();

        Ok(Some(TurnOutcome {
            reservation,
            resurrection: ResurrectionOutcome::default(),
            assistant_text,
            written_chunks,
        }))
    }

    /// A position that would land outside `reservation`'s `[p_start,
    /// p_end)` range is a concurrency-safety violation: some other
    /// reservation may already own it. Hard-stop rather than let it admit.
    fn check_in_bounds(position: crate::types::Position, reservation: &Reservation) -> Result<()> {
        if !reservation.contains(position) {
            return Err(Error::Invariant(format!(
                "position {} falls outside reservation [{}, {})",
                position,
                reservation.p_start,
                reservation.p_end()
            )));
        }
        Ok(())
    }

    /// Stream one assistant reply over the current Working Set context,
    /// admitting each token and scoring it as it arrives. A generator
    /// failure mid-stream is not propagated: whatever was emitted before
    /// the failure is still admitted and later flushed as complete
    /// sentences. Running past `reservation`'s upper bound is a hard
    /// stop, not a recoverable failure: it means this window would start
    /// writing into positions another reservation may already own.
    async fn stream_assistant_reply(
        &mut self,
        assistant_turn: crate::types::TurnId,
        mut cursor: crate::types::Position,
        reservation: Reservation,
    ) -> Result<(String, crate::types::Position)> {
        let context_tokens: Vec<TokenSpec> = self
            .working_set
            .active_tokens()
            .iter()
            .map(|t| TokenSpec { token_id: t.token_id, text: t.text.clone() })
            .collect();

        let request = GenerationRequest {
            context_tokens,
            max_tokens: self.config.max_generation,
            temperature: 0.7,
            top_p: 0.95,
        };

        let mut stream = self
            .generator
            .generate_stream(request)
            .await
            .map_err(|e| Error::Generator(e.to_string()))?;

        let mut assistant_text = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(generated) => {
                    Self::check_in_bounds(cursor, &reservation)?;
                    assistant_text.push_str(&generated.text);
                    self.working_set.mark(&generated.attention, assistant_turn);
                    let token = Token::new(cursor, generated.token_id, generated.text.clone(), assistant_turn, 0, Role::Assistant, 0.0);
                    cursor = cursor.succ();
                    self.working_set.admit(vec![token])?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generator failed mid-stream, finalizing complete sentences");
                    break;
                }
            }
        }

        Ok((assistant_text, cursor))
    }

    /// Turn every currently-active sentence belonging to `turns` into a
    /// chunk and persist it, embedding with turn-pair companion context
    /// prepended.
    fn flush_closed_sentences(&mut self, turns: &[crate::types::TurnId]) -> Result<Vec<ChunkKey>> {
        let mut written = Vec::new();
        let sentences = self.working_set.sentences();
        for group in sentences {
            if !turns.contains(&group.key.turn_id) {
                continue;
            }
            if group.tokens.is_empty() {
                continue;
            }
            let chunk = Chunk::from_tokens(group.key, group.tokens, Utc::now());
            let embed_text = self.turn_pair_embedding_text(&chunk)?;
            let written_chunk = self.index.write_chunk_with_context(chunk, &embed_text)?;
            written.push(written_chunk.key);
        }
        Ok(written)
    }

    /// Compose the text actually fed to the embedder: the chunk's own text
    /// preceded by whatever turn-pair companions are already persisted.
    fn turn_pair_embedding_text(&self, chunk: &Chunk) -> Result<String> {
        let mut parts = Vec::new();
        for companion_key in turn_pair_companions(chunk.key) {
            if let Some(companion) = self.index.storage().get_chunk(companion_key)? {
                parts.push(companion.text);
            }
        }
        parts.push(chunk.text.clone());
        Ok(parts.join(" "))
    }
}
