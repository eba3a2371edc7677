//! Database Migrations
//!
//! Schema migration definitions for the persistent store, applied in order
//! on open and tracked in a `schema_version` table.

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: chunks and counter_state",
    up: MIGRATION_V1_UP,
}];

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    turn_id TEXT NOT NULL,
    sentence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    min_position TEXT NOT NULL,
    max_position TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    tokens_json TEXT NOT NULL,
    embedding BLOB,
    model TEXT,
    timestamp TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    UNIQUE(turn_id, sentence_id, role)
);

CREATE INDEX IF NOT EXISTS idx_chunks_timestamp ON chunks(timestamp);
CREATE INDEX IF NOT EXISTS idx_chunks_role ON chunks(role);
CREATE INDEX IF NOT EXISTS idx_chunks_deleted ON chunks(deleted);
CREATE INDEX IF NOT EXISTS idx_chunks_min_position ON chunks(min_position);
CREATE INDEX IF NOT EXISTS idx_chunks_max_position ON chunks(max_position);

CREATE TABLE IF NOT EXISTS counter_state (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    next_position TEXT NOT NULL,
    next_turn TEXT NOT NULL
);

INSERT OR IGNORE INTO counter_state (id, next_position, next_turn) VALUES (0, '0', '0');

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);
"#;

/// Apply all migrations whose version exceeds the currently recorded one.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);",
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [migration.version],
            )?;
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn counter_state_seeded_at_zero() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        let (next_position, next_turn): (String, String) = conn
            .query_row(
                "SELECT next_position, next_turn FROM counter_state WHERE id = 0",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(next_position, "0");
        assert_eq!(next_turn, "0");
    }
}
