//! Working Set: the in-memory, position-ordered sequence of live tokens
//! for one window, plus sentence-level grouping and pruning.

use std::collections::HashSet;

use crate::brightness::{AttentionStep, BrightnessScorer};
use crate::error::{Error, Result};
use crate::types::{ChunkKey, Position, Role, Token, TurnId};

const TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

fn default_abbreviations() -> HashSet<String> {
    [
        "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc", "ltd", "co", "no",
        "fig", "approx",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn ends_with_terminator(text: &str) -> bool {
    text.trim_end().ends_with(TERMINATORS)
}

fn strip_trailing_terminators(text: &str) -> String {
    text.trim_end()
        .trim_end_matches(TERMINATORS)
        .trim()
        .to_lowercase()
}

#[derive(Debug, Clone)]
struct OpenSentence {
    turn_id: TurnId,
    role: Role,
    sentence_id: u32,
    pending_boundary: bool,
    has_content: bool,
}

/// A sentence's tokens and peak brightness, as returned by `sentences()`.
#[derive(Debug, Clone)]
pub struct SentenceGroup {
    pub key: ChunkKey,
    pub tokens: Vec<Token>,
    pub peak: f64,
}

pub struct WorkingSet {
    tokens: Vec<Token>,
    pinned: HashSet<ChunkKey>,
    abbreviations: HashSet<String>,
    open: Option<OpenSentence>,
    scorer: BrightnessScorer,
}

impl WorkingSet {
    pub fn new(scorer: BrightnessScorer) -> Self {
        Self {
            tokens: Vec::new(),
            pinned: HashSet::new(),
            abbreviations: default_abbreviations(),
            open: None,
            scorer,
        }
    }

    pub fn with_abbreviations(mut self, abbreviations: HashSet<String>) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    fn max_position(&self) -> Option<Position> {
        self.tokens.last().map(|t| t.position)
    }

    fn mean_brightness(&self) -> f64 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        self.tokens.iter().map(|t| t.brightness).sum::<f64>() / self.tokens.len() as f64
    }

    fn advance_open_sentence(&mut self, turn_id: TurnId, role: Role) -> u32 {
        match &mut self.open {
            Some(open) if open.turn_id == turn_id && open.role == role => {
                if open.pending_boundary && open.has_content {
                    open.sentence_id += 1;
                    open.pending_boundary = false;
                    open.has_content = false;
                }
                open.sentence_id
            }
            _ => {
                self.open = Some(OpenSentence {
                    turn_id,
                    role,
                    sentence_id: 0,
                    pending_boundary: false,
                    has_content: false,
                });
                0
            }
        }
    }

    fn note_boundary(&mut self, text: &str) {
        let Some(open) = &mut self.open else { return };
        if ends_with_terminator(text) {
            let stem = strip_trailing_terminators(text);
            if !self.abbreviations.contains(stem.as_str()) {
                open.pending_boundary = true;
                return;
            }
        }
        if !text.trim().is_empty() {
            open.has_content = true;
        }
    }

    /// Append freshly generated/tokenized tokens. Each must carry a
    /// position strictly greater than the current maximum; `sentence_id`
    /// is assigned here from the boundary-detection cursor, overwriting
    /// whatever the caller set.
    pub fn admit(&mut self, tokens: Vec<Token>) -> Result<()> {
        for mut token in tokens {
            if let Some(max) = self.max_position() {
                if token.position <= max {
                    return Err(Error::Invariant(format!(
                        "admit: position {} is not strictly greater than current max {}",
                        token.position, max
                    )));
                }
            }

            let sentence_id = self.advance_open_sentence(token.turn_id, token.role);
            token.sentence_id = sentence_id;
            token.brightness = self.scorer.initial_brightness(self.mean_brightness());

            self.note_boundary(&token.text);
            self.tokens.push(token);
        }
        Ok(())
    }

    /// Forward one generation step's attention tensor to the Brightness Scorer.
    pub fn mark(&mut self, step: &AttentionStep, current_turn: TurnId) {
        self.scorer.apply_step(&mut self.tokens, step, current_turn);
    }

    pub fn active_tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Group active tokens by `(turn_id, sentence_id, role)` in position order.
    pub fn sentences(&self) -> Vec<SentenceGroup> {
        let mut groups: Vec<SentenceGroup> = Vec::new();
        for token in &self.tokens {
            let key = ChunkKey {
                turn_id: token.turn_id,
                sentence_id: token.sentence_id,
                role: token.role,
            };
            match groups.last_mut() {
                Some(last) if last.key == key => {
                    last.tokens.push(token.clone());
                    last.peak = last.peak.max(token.brightness);
                }
                _ => groups.push(SentenceGroup {
                    key,
                    tokens: vec![token.clone()],
                    peak: token.brightness,
                }),
            }
        }
        groups
    }

    pub fn pin(&mut self, key: ChunkKey) {
        self.pinned.insert(key);
    }

    pub fn unpin(&mut self, key: ChunkKey) {
        self.pinned.remove(&key);
    }

    /// Remove whole sentences, lowest-peak first (ties toward older
    /// `max_position`), until `active_tokens().len() <= limit`. Pinned
    /// sentences are never removed. Returns the keys of removed sentences.
    pub fn prune_to(&mut self, limit: usize) -> Vec<ChunkKey> {
        let mut removed_keys = Vec::new();

        loop {
            if self.tokens.len() <= limit {
                break;
            }

            let mut groups = self.sentences();
            groups.retain(|g| !self.pinned.contains(&g.key));
            if groups.is_empty() {
                break;
            }

            groups.sort_by(|a, b| {
                a.peak
                    .partial_cmp(&b.peak)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let a_max = a.tokens.iter().map(|t| t.position).max();
                        let b_max = b.tokens.iter().map(|t| t.position).max();
                        a_max.cmp(&b_max)
                    })
            });

            let victim = groups.remove(0);
            let current_brightness = self.scorer_brightness_for(&victim.key);

            self.tokens.retain_mut(|t| {
                let key = ChunkKey {
                    turn_id: t.turn_id,
                    sentence_id: t.sentence_id,
                    role: t.role,
                };
                if key == victim.key {
                    t.brightness_at_deletion = Some(current_brightness.get(&t.position).copied().unwrap_or(t.brightness));
                    t.deleted = true;
                    false
                } else {
                    true
                }
            });

            removed_keys.push(victim.key);

            if self.tokens.len() <= limit {
                break;
            }
        }

        removed_keys
    }

    fn scorer_brightness_for(&self, key: &ChunkKey) -> std::collections::HashMap<Position, f64> {
        self.tokens
            .iter()
            .filter(|t| t.turn_id == key.turn_id && t.sentence_id == key.sentence_id && t.role == key.role)
            .map(|t| (t.position, t.brightness))
            .collect()
    }

    /// Splice previously-archived tokens back into the active sequence at
    /// their original positions, recomputing initial brightness (floor,
    /// current mean, and any earned `brightness_at_deletion`).
    pub fn resurrect(&mut self, mut tokens: Vec<Token>) {
        let mean = self.mean_brightness();
        for token in &mut tokens {
            token.brightness = self
                .scorer
                .resurrection_brightness(mean, token.brightness_at_deletion);
            token.deleted = false;
        }
        self.splice_sorted(tokens);
    }

    /// Reinsert tokens exactly as persisted, without recomputing
    /// brightness — used when reopening a window from a snapshot.
    pub fn restore(&mut self, tokens: Vec<Token>) {
        self.splice_sorted(tokens);
    }

    fn splice_sorted(&mut self, mut incoming: Vec<Token>) {
        incoming.sort_by_key(|t| t.position);
        for token in incoming {
            let idx = self
                .tokens
                .binary_search_by_key(&token.position, |t| t.position)
                .unwrap_or_else(|i| i);
            if idx < self.tokens.len() && self.tokens[idx].position == token.position {
                continue;
            }
            self.tokens.insert(idx, token);
        }
    }

    /// The set of active positions, for window-close snapshotting.
    pub fn snapshot(&self) -> Vec<Position> {
        self.tokens.iter().map(|t| t.position).collect()
    }

    /// Remove every active token belonging to `key`, pinned or not — used
    /// by an explicit caller delete, as opposed to peak-based pruning.
    /// Returns the removed tokens, empty if `key` wasn't active.
    pub fn remove_sentence(&mut self, key: ChunkKey) -> Vec<Token> {
        let mut removed = Vec::new();
        self.tokens.retain(|t| {
            let tkey = ChunkKey { turn_id: t.turn_id, sentence_id: t.sentence_id, role: t.role };
            if tkey == key {
                removed.push(t.clone());
                false
            } else {
                true
            }
        });
        self.pinned.remove(&key);
        removed
    }
}
