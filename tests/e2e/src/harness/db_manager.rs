//! Test session harness: wires a `Storage`, a `HashEmbedder`, and a
//! `ScriptedGenerator` into a `SessionController`, isolated per test the
//! same way `TestDatabaseManager` isolates a raw `Storage`.

use std::path::{Path, PathBuf};

use luminal_core::{Config, HashEmbedder, SemanticIndex, SessionController, Storage};
use tempfile::TempDir;

use crate::harness::generator::ScriptedGenerator;

pub struct TestSession {
    pub controller: SessionController<HashEmbedder, ScriptedGenerator>,
    _temp_dir: Option<TempDir>,
    db_path: Option<PathBuf>,
}

impl TestSession {
    /// An isolated in-memory store — the common case for single-window tests.
    pub fn new_in_memory(generator: ScriptedGenerator) -> Self {
        Self::new_in_memory_with_config(generator, Config::default())
    }

    /// Same as `new_in_memory`, with a caller-supplied budget configuration
    /// (used by tests that need to force a specific resurrection budget).
    pub fn new_in_memory_with_config(generator: ScriptedGenerator, config: Config) -> Self {
        let index = SemanticIndex::new(Storage::open_in_memory().expect("open in-memory store"), HashEmbedder::new());
        Self {
            controller: SessionController::new(index, generator, config),
            _temp_dir: None,
            db_path: None,
        }
    }

    /// A file-backed store in a fresh temp directory, for tests that need a
    /// durable path (e.g. opening a second controller against the same file).
    pub fn new_temp(generator: ScriptedGenerator) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("luminal-test.sqlite3");
        let index = SemanticIndex::new(Storage::open(&db_path).expect("open file store"), HashEmbedder::new());
        Self {
            controller: SessionController::new(index, generator, Config::default()),
            _temp_dir: Some(temp_dir),
            db_path: Some(db_path),
        }
    }

    /// A second controller over an already-existing file-backed store, to
    /// simulate a second concurrently-running window (Scenario D).
    pub fn open_second_window(path: &Path, generator: ScriptedGenerator) -> Self {
        let index = SemanticIndex::new(Storage::open(path).expect("open file store"), HashEmbedder::new());
        Self {
            controller: SessionController::new(index, generator, Config::default()),
            _temp_dir: None,
            db_path: Some(path.to_path_buf()),
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
