//! SQLite Storage Implementation
//!
//! Durable backing for chunks and the position/turn counter.
//! Two connections — one writer, one reader — guarded by separate mutexes
//! so reads never queue behind a write transaction.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::types::{Chunk, ChunkKey, CounterState, Position, Reservation, Role, Token, TurnId};

use super::migrations::apply_migrations;

/// Storage error type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk not found: {0}")]
    NotFound(ChunkKey),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The full persisted state of one store, for backup/migration tooling.
/// `counter_state` sits at the head of the object so a restore can advance
/// the destination's counter before any chunk lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedStore {
    pub counter_state: CounterState,
    pub chunks: Vec<Chunk>,
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn role_from_str(s: &str) -> Result<Role> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(StorageError::InvalidTimestamp(format!("unknown role: {other}"))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{value}: {e}")))
}

/// Durable chunk + counter store. All methods take `&self`; interior
/// mutexes make `Storage` `Send + Sync` so callers hold it behind an `Arc`
/// rather than an `Arc<Mutex<Storage>>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if absent) the database at `path`, applying migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    /// Open an in-memory store, useful for tests and the REPL's ephemeral
    /// mode. A second `:memory:` connection would open an unrelated
    /// database, so both roles share a URI-addressed shared-cache
    /// in-memory database instead.
    pub fn open_in_memory() -> Result<Self> {
        let uri = format!("file:luminal-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI;

        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&writer_conn)?;
        apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::LockPoisoned("writer".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::LockPoisoned("reader".into()))
    }

    /// Atomically reserve a pair of turn ids and a disjoint run of `n`
    /// positions. Serializes on the singleton `counter_state` row inside
    /// one transaction so concurrent callers never observe overlapping
    /// ranges.
    pub fn reserve_ids(&self, n: u128) -> Result<Reservation> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        let (next_position, next_turn): (String, String) = tx.query_row(
            "SELECT next_position, next_turn FROM counter_state WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let p_start: u128 = next_position
            .parse()
            .map_err(|_| StorageError::InvalidTimestamp("corrupt next_position".into()))?;
        let t_start: u128 = next_turn
            .parse()
            .map_err(|_| StorageError::InvalidTimestamp("corrupt next_turn".into()))?;

        let reservation = Reservation {
            t_user: TurnId(t_start),
            t_assistant: TurnId(t_start + 1),
            p_start: Position(p_start),
            n,
        };

        tx.execute(
            "UPDATE counter_state SET next_position = ?1, next_turn = ?2 WHERE id = 0",
            params![(p_start + n).to_string(), (t_start + 2).to_string()],
        )?;

        tx.commit()?;
        Ok(reservation)
    }

    /// Current counter snapshot, without reserving anything.
    pub fn counter_state(&self) -> Result<CounterState> {
        let reader = self.reader()?;
        let (next_position, next_turn): (String, String) = reader.query_row(
            "SELECT next_position, next_turn FROM counter_state WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let next_position: u128 = next_position
            .parse()
            .map_err(|_| StorageError::InvalidTimestamp("corrupt next_position".into()))?;
        let next_turn: u128 = next_turn
            .parse()
            .map_err(|_| StorageError::InvalidTimestamp("corrupt next_turn".into()))?;
        Ok(CounterState {
            next_position: Position(next_position),
            next_turn: TurnId(next_turn),
        })
    }

    /// Advance the counter to at least `state`, never regressing it — used
    /// by import tooling so ids allocated after a restore never collide
    /// with the ones just imported, without clobbering ids a concurrently
    /// running writer may have already claimed past that point.
    pub fn advance_counter_state(&self, state: CounterState) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let (next_position, next_turn): (String, String) = tx.query_row(
            "SELECT next_position, next_turn FROM counter_state WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let current_position: u128 = next_position.parse().unwrap_or(0);
        let current_turn: u128 = next_turn.parse().unwrap_or(0);

        let new_position = current_position.max(state.next_position.get());
        let new_turn = current_turn.max(state.next_turn.get());

        tx.execute(
            "UPDATE counter_state SET next_position = ?1, next_turn = ?2 WHERE id = 0",
            params![new_position.to_string(), new_turn.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace a chunk inside a single transaction: the
    /// `UNIQUE(turn_id, sentence_id, role)` constraint makes this
    /// idempotent under retry.
    pub fn write_chunk(&self, chunk: &Chunk) -> Result<()> {
        let tokens_json = serde_json::to_string(&chunk.tokens)?;
        let embedding_bytes = chunk
            .embedding
            .as_ref()
            .map(|v| v.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>());

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "INSERT INTO chunks (
                turn_id, sentence_id, role, text, min_position, max_position,
                token_count, tokens_json, embedding, model, timestamp, deleted, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(turn_id, sentence_id, role) DO UPDATE SET
                text = excluded.text,
                min_position = excluded.min_position,
                max_position = excluded.max_position,
                token_count = excluded.token_count,
                tokens_json = excluded.tokens_json,
                embedding = excluded.embedding,
                model = excluded.model,
                timestamp = excluded.timestamp,
                deleted = excluded.deleted,
                deleted_at = excluded.deleted_at",
            params![
                chunk.key.turn_id.to_string(),
                chunk.key.sentence_id,
                role_to_str(chunk.key.role),
                chunk.text,
                chunk.min_position.to_string(),
                chunk.max_position.to_string(),
                chunk.token_count,
                tokens_json,
                embedding_bytes,
                chunk.model,
                chunk.timestamp.to_rfc3339(),
                chunk.deleted as i32,
                chunk.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
        let turn_id_raw: String = row.get("turn_id")?;
        let sentence_id: u32 = row.get("sentence_id")?;
        let role_raw: String = row.get("role")?;
        let text: String = row.get("text")?;
        let min_position_raw: String = row.get("min_position")?;
        let max_position_raw: String = row.get("max_position")?;
        let token_count: u32 = row.get("token_count")?;
        let tokens_json: String = row.get("tokens_json")?;
        let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;
        let model: Option<String> = row.get("model")?;
        let timestamp_raw: String = row.get("timestamp")?;
        let deleted: i32 = row.get("deleted")?;
        let deleted_at_raw: Option<String> = row.get("deleted_at")?;

        let turn_id = TurnId(turn_id_raw.parse().unwrap_or(0));
        let role = role_from_str(&role_raw).unwrap_or(Role::User);

        Ok(Chunk {
            key: ChunkKey { turn_id, sentence_id, role },
            tokens: serde_json::from_str::<Vec<Token>>(&tokens_json).unwrap_or_default(),
            text,
            min_position: Position(min_position_raw.parse().unwrap_or(0)),
            max_position: Position(max_position_raw.parse().unwrap_or(0)),
            token_count,
            embedding: embedding_bytes.map(|bytes| {
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }),
            model,
            timestamp: parse_timestamp(&timestamp_raw).unwrap_or_else(|_| Utc::now()),
            deleted: deleted != 0,
            deleted_at: deleted_at_raw.and_then(|s| parse_timestamp(&s).ok()),
        })
    }

    /// Fetch a single chunk by its natural key.
    pub fn get_chunk(&self, key: ChunkKey) -> Result<Option<Chunk>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM chunks WHERE turn_id = ?1 AND sentence_id = ?2 AND role = ?3",
        )?;
        let chunk = stmt
            .query_row(
                params![key.turn_id.to_string(), key.sentence_id, role_to_str(key.role)],
                |row| Self::row_to_chunk(row),
            )
            .optional()?;
        Ok(chunk)
    }

    /// All non-deleted chunks carrying an embedding, in timestamp order —
    /// the candidate set a semantic-index scan ranks over.
    pub fn list_searchable_chunks(&self) -> Result<Vec<Chunk>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM chunks WHERE deleted = 0 AND embedding IS NOT NULL ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| Self::row_to_chunk(row))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Chunks whose `[min_position, max_position]` run overlaps
    /// `[min_pos, max_pos]` — used to recover the token sequence backing a
    /// working-set admission window.
    pub fn chunks_overlapping_range(&self, min_pos: Position, max_pos: Position) -> Result<Vec<Chunk>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM chunks WHERE max_position >= ?1 AND min_position <= ?2 AND deleted = 0 ORDER BY min_position ASC",
        )?;
        let rows = stmt.query_map(
            params![min_pos.get().to_string(), max_pos.get().to_string()],
            |row| Self::row_to_chunk(row),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Soft-delete a chunk: embedding nulled and marked deleted, so
    /// `undelete`'s unconditional re-embed is a real recovery step rather
    /// than a no-op over a still-present vector.
    pub fn soft_delete(&self, key: ChunkKey) -> Result<()> {
        let writer = self.writer()?;
        let rows = writer.execute(
            "UPDATE chunks SET embedding = NULL, deleted = 1, deleted_at = ?1
             WHERE turn_id = ?2 AND sentence_id = ?3 AND role = ?4",
            params![
                Utc::now().to_rfc3339(),
                key.turn_id.to_string(),
                key.sentence_id,
                role_to_str(key.role),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(key));
        }
        Ok(())
    }

    /// Clear the deleted flag on a chunk.
    pub fn undelete(&self, key: ChunkKey) -> Result<()> {
        let writer = self.writer()?;
        let rows = writer.execute(
            "UPDATE chunks SET deleted = 0, deleted_at = NULL
             WHERE turn_id = ?1 AND sentence_id = ?2 AND role = ?3",
            params![key.turn_id.to_string(), key.sentence_id, role_to_str(key.role)],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(key));
        }
        Ok(())
    }

    /// Overwrite a chunk's embedding and model tag in place — used by
    /// `re_embed_all` when a companion turn arrives late (spec Open Questions).
    pub fn update_embedding(&self, key: ChunkKey, embedding: &[f32], model: &str) -> Result<()> {
        let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let writer = self.writer()?;
        let rows = writer.execute(
            "UPDATE chunks SET embedding = ?1, model = ?2
             WHERE turn_id = ?3 AND sentence_id = ?4 AND role = ?5",
            params![bytes, model, key.turn_id.to_string(), key.sentence_id, role_to_str(key.role)],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(key));
        }
        Ok(())
    }

    /// All chunks including deleted ones, plus the counter snapshot, for
    /// export/backup tooling.
    pub fn export_all(&self) -> Result<ExportedStore> {
        let counter_state = self.counter_state()?;
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT * FROM chunks ORDER BY min_position ASC")?;
        let rows = stmt.query_map([], |row| Self::row_to_chunk(row))?;
        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(ExportedStore { counter_state, chunks })
    }

    /// Bulk-load an exported store into a (possibly fresh) store,
    /// preserving chunk keys, then advances `counter_state` so ids
    /// allocated afterward never collide with the imported range.
    pub fn import_all(&self, export: &ExportedStore) -> Result<()> {
        for chunk in &export.chunks {
            self.write_chunk(chunk)?;
        }
        self.advance_counter_state(export.counter_state)?;
        Ok(())
    }
}
