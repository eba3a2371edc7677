//! Core data model: positions, turns, roles, tokens, and chunks.
//!
//! Positions and turn ids are conceptually unbounded counters. We represent
//! them as `u128` newtypes rather than pulling in a bignum crate: no
//! dependency in this workspace's lineage reaches for one, and a 128-bit
//! monotone counter outlives any realistic conversation.
//! Both newtypes serialize as decimal strings at external boundaries to
//! avoid the precision loss a JSON number would risk.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! decimal_string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u128);

        impl $name {
            pub const ZERO: $name = $name(0);

            pub fn get(self) -> u128 {
                self.0
            }

            pub fn succ(self) -> $name {
                $name(self.0 + 1)
            }

            /// Advance by `n`, returning the original value (pre-increment style
            /// range allocation: `let start = counter.advance(n)` yields `[start, start+n)`).
            pub fn advance(&mut self, n: u128) -> $name {
                let start = *self;
                self.0 += n;
                start
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.parse()?))
            }
        }

        impl From<u128> for $name {
            fn from(v: u128) -> Self {
                $name(v)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse::<u128>()
                    .map($name)
                    .map_err(|e| de::Error::custom(format!("invalid decimal integer: {}", e)))
            }
        }
    };
}

decimal_string_newtype!(Position);
decimal_string_newtype!(TurnId);

/// The three roles a token or chunk can carry. Exhaustive everywhere the
/// spec calls for role-based branching (turn-pair derivation, reflection
/// injection) — never add a wildcard arm over this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// The atomic unit: one emitted token, born once, never renumbered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub position: Position,
    pub token_id: u32,
    pub text: String,
    pub turn_id: TurnId,
    pub sentence_id: u32,
    pub role: Role,
    pub brightness: f64,
    /// Set when the token is pruned out of a working set; preserved so a
    /// later resurrection can respect earned reputation.
    pub brightness_at_deletion: Option<f64>,
    pub deleted: bool,
}

impl Token {
    pub fn new(
        position: Position,
        token_id: u32,
        text: impl Into<String>,
        turn_id: TurnId,
        sentence_id: u32,
        role: Role,
        brightness: f64,
    ) -> Self {
        Self {
            position,
            token_id,
            text: text.into(),
            turn_id,
            sentence_id,
            role,
            brightness,
            brightness_at_deletion: None,
            deleted: false,
        }
    }
}

/// The unique key identifying a sentence (chunk): `(turn_id, sentence_id, role)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub turn_id: TurnId,
    pub sentence_id: u32,
    pub role: Role,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.turn_id, self.sentence_id, self.role)
    }
}

/// A contiguous run of tokens sharing `(turn_id, sentence_id, role)` — the
/// unit of embedding, storage, pruning, and resurrection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub key: ChunkKey,
    pub tokens: Vec<Token>,
    pub text: String,
    pub min_position: Position,
    pub max_position: Position,
    pub token_count: u32,
    pub embedding: Option<Vec<f32>>,
    pub model: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub deleted: bool,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Chunk {
    /// Build a chunk from its closed token run, reconstructing `text` by
    /// joining token texts and deriving `min_position`/`max_position` and
    /// `token_count` from the sequence. Chunks are formed when a sentence
    /// closes.
    pub fn from_tokens(key: ChunkKey, tokens: Vec<Token>, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        debug_assert!(!tokens.is_empty(), "a chunk must contain at least one token");
        let min_position = tokens.iter().map(|t| t.position).min().unwrap_or(Position::ZERO);
        let max_position = tokens.iter().map(|t| t.position).max().unwrap_or(Position::ZERO);
        let text = tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let token_count = tokens.len() as u32;
        Self {
            key,
            tokens,
            text,
            min_position,
            max_position,
            token_count,
            embedding: None,
            model: None,
            timestamp,
            deleted: false,
            deleted_at: None,
        }
    }

    /// A chunk is searchable iff it carries an embedding and is not deleted.
    pub fn is_searchable(&self) -> bool {
        self.embedding.is_some() && !self.deleted
    }
}

/// Result of `SemanticIndex::reserve_ids`: two consecutive turn ids and a
/// disjoint position range `[p_start, p_start + n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub t_user: TurnId,
    pub t_assistant: TurnId,
    pub p_start: Position,
    pub n: u128,
}

impl Reservation {
    pub fn p_end(&self) -> Position {
        Position(self.p_start.0 + self.n)
    }

    pub fn contains(&self, p: Position) -> bool {
        p.0 >= self.p_start.0 && p.0 < self.p_end().0
    }
}

/// Snapshot of the global id counter backing `reserve_ids`: positions and
/// turn ids below these are guaranteed never to be re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub next_position: Position,
    pub next_turn: TurnId,
}
