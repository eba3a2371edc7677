//! Persistent Store Module
//!
//! SQLite-backed durable storage for chunks and the global counter state:
//! per-store primary-key put/get, ordered-range scans, a secondary-index
//! set on `chunks`, and ACID multi-table transactions for id reservation
//! and chunk writes.

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{ExportedStore, Result, Storage, StorageError};
