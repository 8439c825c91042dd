use std::collections::HashSet;
use std::sync::Arc;

use briscola_lobby::config::WaitingListConfig;
use briscola_lobby::core::game::{BriscolaDealer, GameEngine, GameSession};
use briscola_lobby::core::waiting_list::{StartOutcome, WaitingListManager};
use briscola_lobby::error::{LobbyError, Result};

fn manager(lists: &[(&str, usize)]) -> WaitingListManager {
    let configs: Vec<WaitingListConfig> = lists
        .iter()
        .map(|(name, capacity)| WaitingListConfig::new(*name, *capacity))
        .collect();
    WaitingListManager::new(&configs, Arc::new(BriscolaDealer::seeded(11))).unwrap()
}

struct BrokenEngine;

impl GameEngine for BrokenEngine {
    fn create_game(&self, _game_id: &str, _players: &[String]) -> Result<GameSession> {
        Err(LobbyError::EngineError("dealer on strike".to_string()))
    }
}

#[tokio::test]
async fn test_awaiting_until_capacity_then_started() {
    let manager = manager(&[("TRIO", 3)]);

    let a = manager.add_player("TRIO", "a", "token-a").await.unwrap();
    assert!(matches!(
        manager.try_start_game("TRIO", &a).await.unwrap(),
        StartOutcome::AwaitingPlayers { .. }
    ));

    let b = manager.add_player("TRIO", "b", "token-b").await.unwrap();
    assert!(matches!(
        manager.try_start_game("TRIO", &b).await.unwrap(),
        StartOutcome::AwaitingPlayers { .. }
    ));
    assert_eq!(
        manager.waiting_tokens("TRIO").await.unwrap(),
        vec!["token-a".to_string(), "token-b".to_string()]
    );

    let c = manager.add_player("TRIO", "c", "token-c").await.unwrap();
    match manager.try_start_game("TRIO", &c).await.unwrap() {
        StartOutcome::Started { session, announce } => {
            assert!(announce);
            assert_eq!(session.game_id, a.game_id);
            assert_eq!(session.ordered_players, vec!["a", "b", "c"]);
        }
        other => panic!("expected Started, got {:?}", other),
    }

    // The list is immediately reusable for the next game
    assert_eq!(manager.waiting_count("TRIO").await.unwrap(), 0);
    let d = manager.add_player("TRIO", "d", "token-d").await.unwrap();
    assert_ne!(d.game_id, a.game_id);
}

#[tokio::test]
async fn test_unknown_list() {
    let manager = manager(&[("TEST", 2)]);
    let err = manager.add_player("NOPE", "a", "a").await.unwrap_err();
    assert_eq!(err, LobbyError::UnknownList("NOPE".to_string()));

    let ticket = manager.add_player("TEST", "a", "a").await.unwrap();
    let err = manager.try_start_game("NOPE", &ticket).await.unwrap_err();
    assert_eq!(err, LobbyError::UnknownList("NOPE".to_string()));
}

#[tokio::test]
async fn test_duplicate_join_is_rejected() {
    let manager = manager(&[("TEST", 3)]);
    manager.add_player("TEST", "p1", "t").await.unwrap();

    let err = manager.add_player("TEST", "p1", "t").await.unwrap_err();
    assert_eq!(err, LobbyError::DuplicatePlayer("p1".to_string()));
    assert!(err.is_client_error());
    assert_eq!(manager.waiting_count("TEST").await.unwrap(), 1);
}

#[tokio::test]
async fn test_late_member_observes_existing_game() {
    let manager = manager(&[("TEST", 2)]);
    let a = manager.add_player("TEST", "a", "a").await.unwrap();
    let b = manager.add_player("TEST", "b", "b").await.unwrap();

    let first = manager.try_start_game("TEST", &a).await.unwrap();
    let second = manager.try_start_game("TEST", &b).await.unwrap();

    match (first, second) {
        (
            StartOutcome::Started { session: s1, announce: true },
            StartOutcome::Started { session: s2, announce: false },
        ) => assert!(Arc::ptr_eq(&s1, &s2)),
        other => panic!("unexpected outcomes {:?}", other),
    }
}

#[tokio::test]
async fn test_join_into_full_list_starts_next_cycle() {
    let manager = manager(&[("TEST", 2)]);
    let a = manager.add_player("TEST", "a", "a").await.unwrap();
    let b = manager.add_player("TEST", "b", "b").await.unwrap();
    // c arrives before anyone claimed the spawn
    let c = manager.add_player("TEST", "c", "c").await.unwrap();
    assert_ne!(c.game_id, a.game_id);
    assert_eq!(manager.waiting_count("TEST").await.unwrap(), 1);

    match manager.try_start_game("TEST", &b).await.unwrap() {
        StartOutcome::Started { session, announce } => {
            assert!(announce);
            assert_eq!(session.ordered_players, vec!["a", "b"]);
        }
        other => panic!("expected Started, got {:?}", other),
    }
    assert!(matches!(
        manager.try_start_game("TEST", &c).await.unwrap(),
        StartOutcome::AwaitingPlayers { game_id } if game_id == c.game_id
    ));
}

#[tokio::test]
async fn test_concurrent_joins_spawn_exactly_one_game() {
    const CAPACITY: usize = 8;
    let manager = Arc::new(manager(&[("BIG", CAPACITY)]));

    let mut handles = Vec::new();
    for i in 0..CAPACITY {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let player = format!("player-{}", i);
            let ticket = manager.add_player("BIG", &player, &player).await.unwrap();
            let outcome = manager.try_start_game("BIG", &ticket).await.unwrap();
            (ticket, outcome)
        }));
    }

    let results: Vec<_> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut announcers = 0;
    let mut game_ids = HashSet::new();
    for (ticket, outcome) in &results {
        game_ids.insert(ticket.game_id.clone());
        match outcome {
            StartOutcome::Started { announce: true, .. } => announcers += 1,
            StartOutcome::Started { .. } | StartOutcome::AwaitingPlayers { .. } => {}
        }
    }
    assert_eq!(announcers, 1);
    assert_eq!(game_ids.len(), 1);

    // Everyone who was told to wait now sees the same game, nobody was lost
    let mut players = HashSet::new();
    for (ticket, _) in &results {
        match manager.try_start_game("BIG", ticket).await.unwrap() {
            StartOutcome::Started { session, announce } => {
                assert!(!announce);
                assert_eq!(session.game_id, ticket.game_id);
                assert_eq!(session.ordered_players.len(), CAPACITY);
                players.extend(session.ordered_players.iter().cloned());
            }
            other => panic!("expected Started, got {:?}", other),
        }
    }
    assert_eq!(players.len(), CAPACITY);
    assert_eq!(manager.waiting_count("BIG").await.unwrap(), 0);
}

#[tokio::test]
async fn test_lists_are_independent() {
    let manager = manager(&[("DUO", 2), ("QUAD", 4)]);
    assert_eq!(manager.list_names(), vec!["DUO".to_string(), "QUAD".to_string()]);

    let duo = manager.add_player("DUO", "a", "a").await.unwrap();
    let quad = manager.add_player("QUAD", "a", "a").await.unwrap();
    assert_ne!(duo.game_id, quad.game_id);
    assert_eq!(manager.capacity("QUAD").await.unwrap(), 4);
    assert_eq!(manager.waiting_count("DUO").await.unwrap(), 1);
    assert_eq!(manager.waiting_count("QUAD").await.unwrap(), 1);
}

#[tokio::test]
async fn test_engine_failure_keeps_players_waiting() {
    let manager = WaitingListManager::new(
        &[WaitingListConfig::new("TEST", 2)],
        Arc::new(BrokenEngine),
    )
    .unwrap();

    manager.add_player("TEST", "a", "a").await.unwrap();
    let b = manager.add_player("TEST", "b", "b").await.unwrap();

    let err = manager.try_start_game("TEST", &b).await.unwrap_err();
    assert!(matches!(err, LobbyError::EngineError(_)));
    assert!(!err.is_client_error());
    assert_eq!(manager.waiting_count("TEST").await.unwrap(), 2);

    // The next joiner is not blocked by the refused cycle
    let c = manager.add_player("TEST", "c", "c").await.unwrap();
    assert_ne!(c.game_id, b.game_id);
    assert_eq!(manager.waiting_tokens("TEST").await.unwrap(), vec!["c".to_string()]);
    let d = manager.add_player("TEST", "d", "d").await.unwrap();
    assert_eq!(d.game_id, c.game_id);
}

#[tokio::test]
async fn test_oversized_list_is_refused_at_startup() {
    let err = WaitingListManager::new(
        &[WaitingListConfig::new("BIG", 14)],
        Arc::new(BriscolaDealer::seeded(1)),
    )
    .err()
    .unwrap();
    assert!(matches!(err, LobbyError::ConfigError(_)));
}

#[tokio::test]
async fn test_retire_game_forgets_session() {
    let manager = manager(&[("SOLO", 1)]);
    let a = manager.add_player("SOLO", "a", "a").await.unwrap();
    manager.try_start_game("SOLO", &a).await.unwrap();

    let retired = manager.retire_game(&a.game_id).await.unwrap();
    assert_eq!(retired.ordered_players, vec!["a"]);
    assert!(manager.retire_game(&a.game_id).await.is_none());
    assert!(manager.try_start_game("SOLO", &a).await.is_err());
}
