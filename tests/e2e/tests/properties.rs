//! Property-style tests over the core invariants the per-turn pipeline
//! depends on: monotone positions, bounded working-set size after pruning,
//! and turn-pair companion symmetry across a spread of keys.

use luminal_core::{
    BrightnessConfig, BrightnessScorer, ChunkKey, Position, Role, Token, TurnId, WorkingSet,
};

/// `succ` must be strictly increasing and round-trip through its decimal
/// string representation, for any starting point.
#[test]
fn position_succ_is_strictly_increasing_and_round_trips_through_decimal_string() {
    let seeds: [u128; 5] = [0, 1, 999, u64::MAX as u128, u128::MAX - 10];
    for seed in seeds {
        let mut p = Position::from(seed);
        for _ in 0..5 {
            let next = p.succ();
            assert!(next.get() > p.get(), "succ must strictly increase");
            let round_tripped: Position = next.to_string().parse().unwrap();
            assert_eq!(round_tripped, next);
            p = next;
        }
    }
}

/// `prune_to(limit)` must never leave more active tokens than `limit`,
/// whatever the admitted token count was.
#[test]
fn prune_to_never_leaves_more_than_the_requested_limit() {
    for token_count in [0usize, 1, 10, 50, 500] {
        for limit in [0usize, 1, 25, 1000] {
            let mut ws = WorkingSet::new(BrightnessScorer::new(BrightnessConfig::default()));
            let tokens: Vec<Token> = (0..token_count)
                .map(|i| {
                    Token::new(
                        Position::from(i as u128),
                        i as u32,
                        format!("tok{} ", i),
                        TurnId::from((i / 2) as u128),
                        0,
                        if i % 2 == 0 { Role::User } else { Role::Assistant },
                        0.0,
                    )
                })
                .collect();
            ws.admit(tokens).unwrap();
            ws.prune_to(limit);
            assert!(
                ws.active_tokens().len() <= limit.max(0),
                "active tokens ({}) exceeded limit {} for token_count {}",
                ws.active_tokens().len(),
                limit,
                token_count
            );
        }
    }
}

/// Turn-pair companions never include the key itself, across a spread of
/// turn ids and roles.
#[test]
fn turn_pair_companions_never_include_the_originating_key() {
    for turn in [0u128, 1, 2, 50, 1_000] {
        for role in [Role::User, Role::Assistant, Role::System] {
            let key = ChunkKey { turn_id: TurnId::from(turn), sentence_id: 0, role };
            let companions = luminal_core::turn_pair_companions(key);
            assert!(!companions.contains(&key), "companions of {} included itself", key);
        }
    }
}

/// System-role chunks have no turn-pair companions: reflection turns don't
/// pull in any neighboring turn by construction.
#[test]
fn system_role_has_no_turn_pair_companions() {
    let key = ChunkKey { turn_id: TurnId::from(7), sentence_id: 0, role: Role::System };
    assert!(luminal_core::turn_pair_companions(key).is_empty());
}

/// User/assistant companion derivation is symmetric across a turn pair: the
/// user chunk at turn N always lists the assistant chunk at turn N+1 as a
/// companion, and that assistant chunk lists the user chunk back — a turn
/// pair is a user turn immediately followed by its assistant reply, one
/// turn id apart.
#[test]
fn user_and_assistant_companions_across_a_turn_pair_are_mutual() {
    for turn in [1u128, 5, 100] {
        let user_key = ChunkKey { turn_id: TurnId::from(turn), sentence_id: 0, role: Role::User };
        let assistant_key = ChunkKey { turn_id: TurnId::from(turn + 1), sentence_id: 0, role: Role::Assistant };

        let user_companions = luminal_core::turn_pair_companions(user_key);
        let assistant_companions = luminal_core::turn_pair_companions(assistant_key);

        assert!(user_companions.contains(&assistant_key));
        assert!(assistant_companions.contains(&user_key));
    }
}
