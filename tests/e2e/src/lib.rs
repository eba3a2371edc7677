//! Shared harness for the luminal end-to-end test suite.

pub mod harness {
    mod db_manager;
    mod generator;

    pub use db_manager::TestSession;
    pub use generator::ScriptedGenerator;
}
