//! Resurrection Planner: on each user turn, decides which archived chunks
//! re-enter the Working Set under a strict token budget, honouring
//! turn-pair coherence.

use std::collections::HashSet;

use crate::config::ResurrectionConfig;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::index::SemanticIndex;
use crate::types::{Chunk, ChunkKey, Role, TurnId};
use crate::working_set::WorkingSet;

/// Everything the planner needs to know about the current turn to
/// compute its token budget.
#[derive(Debug, Clone, Copy)]
pub struct ResurrectionInputs {
    /// Active tokens in the Working Set before/after the just-admitted user turn.
    pub active_tokens: usize,
    pub user_tokens_just_added: usize,
    /// Generator's max context, `M`.
    pub context_limit: usize,
    /// Reserved user-token count, `U`.
    pub reserved_user_tokens: usize,
    /// Planned max generation length, `G`.
    pub max_generation: usize,
    /// Safety overhead, `O`.
    pub overhead: usize,
}

/// Result of one planning pass.
#[derive(Debug, Clone, Default)]
pub struct ResurrectionOutcome {
    pub budget: usize,
    pub used: usize,
    pub resurrected: Vec<ChunkKey>,
    pub pruned: Vec<ChunkKey>,
}

/// Turn-pair companions for `key`, excluding `key` itself so a sentence-0
/// candidate never double-counts. Shared between the planner's
/// resurrection pass and the Session Controller's turn-pair embedding context.
pub fn turn_pair_companions(key: ChunkKey) -> Vec<ChunkKey> {
    let mut out = match key.role {
        Role::Assistant => {
            let mut v = Vec::new();
            if let Some(prev) = key.turn_id.get().checked_sub(1) {
                v.push(ChunkKey { turn_id: TurnId(prev), sentence_id: 0, role: Role::User });
            }
            v.push(ChunkKey { turn_id: key.turn_id, sentence_id: 0, role: Role::Assistant });
            v
        }
        Role::User => vec![
            ChunkKey { turn_id: key.turn_id, sentence_id: 0, role: Role::User },
            ChunkKey { turn_id: TurnId(key.turn_id.get() + 1), sentence_id: 0, role: Role::Assistant },
        ],
        Role::System => Vec::new(),
    };
    out.retain(|c| *c != key);
    out
}

/// Overscan heuristic: an assumed average token count for an archived
/// sentence, used only to size the candidate scan so it comfortably
/// covers several budgets' worth of material before the greedy loop below
/// does real per-candidate budget accounting.
const ASSUMED_AVG_CHUNK_TOKENS: usize = 24;

pub struct ResurrectionPlanner {
    config: ResurrectionConfig,
}

impl ResurrectionPlanner {
    pub fn new(config: ResurrectionConfig) -> Self {
        Self { config }
    }

    fn budget(inputs: &ResurrectionInputs) -> i64 {
        let live_before_turn = inputs.active_tokens as i64 - inputs.user_tokens_just_added as i64;
        inputs.context_limit as i64
            - live_before_turn
            - inputs.reserved_user_tokens as i64
            - inputs.max_generation as i64
            - inputs.overhead as i64
    }

    /// Run one planning pass: compute the budget, pruning first if it's
    /// negative, then greedily resurrect query candidates and their
    /// turn-pair companions under budget.
    pub fn plan<E: Embedder>(
        &self,
        index: &SemanticIndex<E>,
        working_set: &mut WorkingSet,
        user_text: &str,
        inputs: ResurrectionInputs,
    ) -> Result<ResurrectionOutcome> {
        let mut outcome = ResurrectionOutcome::default();

        let raw_budget = Self::budget(&inputs);
        let mut budget = if raw_budget < 0 {
            let reclaim = (-raw_budget) as usize;
            let current_len = working_set.active_tokens().len();
            let limit = current_len.saturating_sub(reclaim);
            outcome.pruned = working_set.prune_to(limit);
            0usize
        } else {
            raw_budget as usize
        };

        if budget == 0 {
            outcome.budget = 0;
            return Ok(outcome);
        }
        outcome.budget = budget;

        // Candidate count scales with the budget so a large budget isn't
        // starved by a small fixed top_k: total candidate token-count
        // should cover several multiples of the budget before the greedy
        // loop below filters down to what actually fits.
        let k = self
            .config
            .top_k
            .max((3 * budget).div_ceil(ASSUMED_AVG_CHUNK_TOKENS).max(1));
        let candidates = index.query(user_text, k)?;

        let mut live_keys: HashSet<ChunkKey> = working_set
            .sentences()
            .into_iter()
            .map(|s| s.key)
            .collect();

        for (candidate, _similarity) in candidates {
            if budget == 0 {
                break;
            }

            let mut to_resurrect: Vec<Chunk> = Vec::new();
            let mut cost = 0usize;

            if !live_keys.contains(&candidate.key) {
                cost += candidate.token_count as usize;
                to_resurrect.push(candidate.clone());
            }

            for companion_key in turn_pair_companions(candidate.key) {
                if live_keys.contains(&companion_key) {
                    continue;
                }
                if let Some(companion) = index.storage().get_chunk(companion_key)? {
                    cost += companion.token_count as usize;
                    to_resurrect.push(companion);
                }
            }

            if outcome.used + cost > budget {
                continue;
            }

            for chunk in to_resurrect {
                live_keys.insert(chunk.key);
                outcome.resurrected.push(chunk.key);
                working_set.resurrect(chunk.tokens);
            }
            outcome.used += cost;
            budget = outcome.budget.saturating_sub(outcome.used);
        }

        Ok(outcome)
    }
}
