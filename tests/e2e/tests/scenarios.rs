//! Full-pipeline scenario tests, one window (or two) driven end to end
//! through `SessionController`.

use luminal_core::Config;
use luminal_e2e_tests::harness::{ScriptedGenerator, TestSession};

/// Scenario A (cold start): empty store, first user message. No
/// resurrection is possible (nothing archived yet); both turns persist
/// with embeddings.
#[tokio::test]
async fn cold_start_persists_both_sides_of_the_first_turn() {
    let generator = ScriptedGenerator::new(10_000).with_script(&["ok", "noted", "."]);
    let mut session = TestSession::new_in_memory(generator);

    let outcome = session.controller.handle_user_turn("Hello").await.unwrap();

    assert!(outcome.resurrection.resurrected.is_empty());
    assert_eq!(outcome.written_chunks.len(), 2, "one user chunk, one assistant chunk");

    for key in &outcome.written_chunks {
        let chunk = session.controller.index().storage().get_chunk(*key).unwrap().unwrap();
        assert!(chunk.embedding.is_some(), "chunk {} should carry an embedding", key);
    }
}

/// Scenario B (resurrection of a pair): an older turn pair about "X" gets
/// pruned out of the active window, then a later query about "X" should
/// bring both the user question and its assistant answer back.
#[tokio::test]
async fn later_query_resurrects_the_turn_pair_it_matches() {
    let generator = ScriptedGenerator::new(10_000)
        .with_script(&["photosynthesis", "converts", "light", "to", "chemical", "energy", "."]);
    let mut session = TestSession::new_in_memory(generator);

    session.controller.handle_user_turn("What is photosynthesis?").await.unwrap();

    // Force the first turn pair out of the active window with unrelated chatter.
    for i in 0..20 {
        session.controller.handle_user_turn(&format!("unrelated filler message number {}", i)).await.unwrap();
        session.controller.working_set();
    }

    let outcome = session.controller.handle_user_turn("Remind me about photosynthesis").await.unwrap();

    let resurrected_roles: Vec<_> = outcome
        .resurrection
        .resurrected
        .iter()
        .map(|k| k.role)
        .collect();
    assert!(!outcome.resurrection.resurrected.is_empty(), "expected at least the matched chunk to resurrect");
    assert!(resurrected_roles.iter().any(|r| matches!(r, luminal_core::Role::User))
        || resurrected_roles.iter().any(|r| matches!(r, luminal_core::Role::Assistant)));
}

/// Scenario C (budget-forced prune): an active window already near the
/// context limit must prune before any resurrection budget is available.
#[tokio::test]
async fn negative_budget_forces_a_prune_pass() {
    let config = Config {
        context_limit: 60,
        max_generation: 10,
        overhead: 2,
        safety_margin: 1,
        ..Config::default()
    };
    let generator = ScriptedGenerator::new(config.context_limit).with_script(&["sure", "."]);
    let mut session = TestSession::new_in_memory_with_config(generator, config);

    // Fill the window well past the limit with short turns.
    for i in 0..30 {
        session.controller.handle_user_turn(&format!("msg {} pad", i)).await.unwrap();
    }

    assert!(
        session.controller.working_set().active_tokens().len() <= 60,
        "working set should have been pruned back under the context limit"
    );
}

/// Scenario D (concurrent writers): two windows reserve disjoint id ranges
/// against the same file-backed store and both persist successfully.
#[tokio::test]
async fn two_windows_against_the_same_store_both_persist() {
    let gen_a = ScriptedGenerator::new(10_000).with_script(&["answer", "from", "window", "a", "."]);
    let mut session_a = TestSession::new_temp(gen_a);
    let db_path = session_a.db_path().unwrap().to_path_buf();

    let gen_b = ScriptedGenerator::new(10_000).with_script(&["answer", "from", "window", "b", "."]);
    let mut session_b = TestSession::open_second_window(&db_path, gen_b);

    let outcome_a = session_a.controller.handle_user_turn("hello from A").await.unwrap();
    let outcome_b = session_b.controller.handle_user_turn("hello from B").await.unwrap();

    assert_ne!(outcome_a.reservation.p_start, outcome_b.reservation.p_start);
    assert!(!outcome_a.written_chunks.is_empty());
    assert!(!outcome_b.written_chunks.is_empty());

    let results = session_b.controller.index().query("hello", 10).unwrap();
    let found_a = results.iter().any(|(c, _)| outcome_a.written_chunks.contains(&c.key));
    let found_b = results.iter().any(|(c, _)| outcome_b.written_chunks.contains(&c.key));
    assert!(found_a && found_b, "query should see chunks from both windows");
}

/// Scenario E (soft-delete): deleting an assistant chunk makes both it and
/// its companion unsearchable, while both survive in export.
#[tokio::test]
async fn soft_delete_removes_a_turn_pair_from_search_but_not_from_export() {
    let generator = ScriptedGenerator::new(10_000).with_script(&["the", "answer", "is", "42", "."]);
    let mut session = TestSession::new_in_memory(generator);

    let outcome = session.controller.handle_user_turn("What is the answer?").await.unwrap();
    let assistant_key = outcome
        .written_chunks
        .iter()
        .find(|k| matches!(k.role, luminal_core::Role::Assistant))
        .copied()
        .unwrap();
    let user_key = outcome
        .written_chunks
        .iter()
        .find(|k| matches!(k.role, luminal_core::Role::User))
        .copied()
        .unwrap();

    session.controller.index().soft_delete(assistant_key).unwrap();
    session.controller.index().soft_delete(user_key).unwrap();

    let results = session.controller.index().query("what is the answer", 10).unwrap();
    assert!(results.iter().all(|(c, _)| c.key != assistant_key && c.key != user_key));

    let exported = session.controller.index().storage().export_all().unwrap();
    assert!(exported.chunks.iter().any(|c| c.key == assistant_key));
    assert!(exported.chunks.iter().any(|c| c.key == user_key));
}

/// Scenario F (reflection): once the inactivity and message-count
/// thresholds are both crossed, a synthetic system+assistant turn is
/// persisted like any other.
#[tokio::test]
async fn reflection_fires_and_persists_a_synthetic_turn() {
    let config = Config {
        reflection: luminal_core::ReflectionConfig {
            min_inactivity_ms: 5,
            min_messages: 2,
            ..luminal_core::ReflectionConfig::default()
        },
        ..Config::default()
    };
    let generator = ScriptedGenerator::new(config.context_limit)
        .with_script(&["hi", "."])
        .with_script(&["here", "is", "a", "summary", "."]);
    let mut session = TestSession::new_in_memory_with_config(generator, config);

    session.controller.handle_user_turn("hi").await.unwrap();
    session.controller.handle_user_turn("hi again").await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let fired = session.controller.maybe_reflect().await.unwrap();
    assert!(fired.is_some(), "reflection should fire once both thresholds are crossed");
    let outcome = fired.unwrap();
    assert!(!outcome.written_chunks.is_empty());
}
