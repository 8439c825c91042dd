use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::WaitingListConfig;
use crate::core::game::{GameEngine, GameSession};
use crate::error::{LobbyError, Result};

/// Proof of membership in one cycle of a waiting list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchmakingTicket {
    pub list_name: String,
    pub player_id: String,
    pub token: String,
    /// Broadcast feed reserved for the cycle the player joined
    pub game_id: String,
}

/// What a joined player should do next
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// The cycle is not full yet; keep polling the broadcast feed
    AwaitingPlayers { game_id: String },
    /// The cycle spawned a game. `announce` is true for exactly one caller
    /// per game, the one expected to publish the start events.
    Started {
        session: Arc<GameSession>,
        announce: bool,
    },
}

#[derive(Debug, Clone)]
struct WaitingEntry {
    player_id: String,
    token: String,
}

struct SpawnedGame {
    session: Arc<GameSession>,
    announced: bool,
}

/// A fixed-capacity matchmaking queue
pub struct WaitingList {
    name: String,
    capacity: usize,
    entries: Vec<WaitingEntry>,
    /// Reserved when the first player of a cycle joins
    game_id: Option<String>,
    /// Games spawned by this list and not yet retired
    spawned: HashMap<String, SpawnedGame>,
}

impl WaitingList {
    pub fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: Vec::with_capacity(capacity),
            game_id: None,
            spawned: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.entries.iter().any(|e| e.player_id == player_id)
    }

    /// Append a player to the current cycle.
    ///
    /// A list that is already full still owes its spawn; it happens here so
    /// the newcomer starts the next cycle. If the engine refuses that spawn
    /// the stuck cycle is dropped.
    fn add(
        &mut self,
        player_id: String,
        token: String,
        engine: &dyn GameEngine,
    ) -> Result<MatchmakingTicket> {
        if self.is_full() {
            log::debug!(
                "Waiting list {} full before its spawn was claimed, spawning now",
                self.name
            );
            if let Err(e) = self.spawn(engine) {
                // A cycle the engine refuses would block every later join
                log::error!(
                    "Waiting list {} dropping cycle {:?} of {} players: {}",
                    self.name,
                    self.game_id,
                    self.entries.len(),
                    e
                );
                self.entries.clear();
                self.game_id = None;
            }
        }

        if self.has_player(&player_id) {
            return Err(LobbyError::DuplicatePlayer(player_id));
        }

        let game_id = self
            .game_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        self.entries.push(WaitingEntry {
            player_id: player_id.clone(),
            token: token.clone(),
        });

        Ok(MatchmakingTicket {
            list_name: self.name.clone(),
            player_id,
            token,
            game_id,
        })
    }

    /// Turn the current full cycle into a game and open the next cycle
    fn spawn(&mut self, engine: &dyn GameEngine) -> Result<Arc<GameSession>> {
        let game_id = self.game_id.clone().ok_or_else(|| {
            LobbyError::InternalError(format!("Waiting list {} has no reserved game", self.name))
        })?;

        let players: Vec<String> = self.entries.iter().map(|e| e.player_id.clone()).collect();
        let session = Arc::new(engine.create_game(&game_id, &players)?);

        self.entries.clear();
        self.game_id = None;
        self.spawned.insert(
            game_id.clone(),
            SpawnedGame {
                session: Arc::clone(&session),
                announced: false,
            },
        );

        log::info!(
            "Waiting list {} spawned game {} with {} players",
            self.name,
            game_id,
            players.len()
        );
        Ok(session)
    }

    fn try_start(
        &mut self,
        ticket: &MatchmakingTicket,
        engine: &dyn GameEngine,
    ) -> Result<StartOutcome> {
        if self.game_id.as_deref() == Some(ticket.game_id.as_str()) && self.is_full() {
            self.spawn(engine)?;
        }

        if let Some(spawned) = self.spawned.get_mut(&ticket.game_id) {
            let announce = !spawned.announced;
            spawned.announced = true;
            return Ok(StartOutcome::Started {
                session: Arc::clone(&spawned.session),
                announce,
            });
        }

        if self.game_id.as_deref() == Some(ticket.game_id.as_str()) {
            return Ok(StartOutcome::AwaitingPlayers {
                game_id: ticket.game_id.clone(),
            });
        }

        Err(LobbyError::InternalError(format!(
            "Game {} is not known to waiting list {}",
            ticket.game_id, self.name
        )))
    }
}

/// Owns every configured waiting list. Each list has its own lock, so lists
/// for different game types never contend.
pub struct WaitingListManager {
    lists: HashMap<String, Arc<Mutex<WaitingList>>>,
    engine: Arc<dyn GameEngine>,
}

impl WaitingListManager {
    pub fn new(configs: &[WaitingListConfig], engine: Arc<dyn GameEngine>) -> Result<Self> {
        let mut lists = HashMap::with_capacity(configs.len());
        for config in configs {
            if config.capacity == 0 {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' must have a positive capacity",
                    config.name
                )));
            }
            if config.capacity > engine.max_players() {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' wants {} players, the game engine seats at most {}",
                    config.name,
                    config.capacity,
                    engine.max_players()
                )));
            }
            let list = WaitingList::new(config.name.clone(), config.capacity);
            if lists
                .insert(config.name.clone(), Arc::new(Mutex::new(list)))
                .is_some()
            {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' declared twice",
                    config.name
                )));
            }
        }

        Ok(Self { lists, engine })
    }

    fn list(&self, name: &str) -> Result<&Arc<Mutex<WaitingList>>> {
        self.lists
            .get(name)
            .ok_or_else(|| LobbyError::UnknownList(name.to_string()))
    }

    /// Add a player to the current cycle of a list
    pub async fn add_player(
        &self,
        list_name: &str,
        player_id: &str,
        token: &str,
    ) -> Result<MatchmakingTicket> {
        let mut list = self.list(list_name)?.lock().await;
        let ticket = list.add(player_id.to_string(), token.to_string(), self.engine.as_ref())?;
        log::debug!(
            "Player {} joined waiting list {} ({}/{})",
            player_id,
            list_name,
            list.len(),
            list.capacity()
        );
        Ok(ticket)
    }

    /// Start the ticket's game if its cycle is full.
    ///
    /// The spawn runs at most once per cycle; later callers from the same
    /// cycle observe the game that was already created.
    pub async fn try_start_game(
        &self,
        list_name: &str,
        ticket: &MatchmakingTicket,
    ) -> Result<StartOutcome> {
        let mut list = self.list(list_name)?.lock().await;
        list.try_start(ticket, self.engine.as_ref())
    }

    /// Forget a spawned game, returning its session if a list knew it
    pub async fn retire_game(&self, game_id: &str) -> Option<Arc<GameSession>> {
        for list in self.lists.values() {
            if let Some(game) = list.lock().await.spawned.remove(game_id) {
                return Some(game.session);
            }
        }
        None
    }

    /// Ids of spawned games started before `cutoff`
    pub async fn games_started_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut stale = Vec::new();
        for list in self.lists.values() {
            let list = list.lock().await;
            stale.extend(
                list.spawned
                    .values()
                    .filter(|game| game.session.started_at < cutoff)
                    .map(|game| game.session.game_id.clone()),
            );
        }
        stale
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every player currently waiting in any list
    pub async fn waiting_players(&self) -> HashSet<String> {
        let mut players = HashSet::new();
        for list in self.lists.values() {
            let list = list.lock().await;
            players.extend(list.entries.iter().map(|e| e.player_id.clone()));
        }
        players
    }

    pub fn has_list(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    /// Players waiting in the current cycle of a list
    pub async fn waiting_count(&self, list_name: &str) -> Result<usize> {
        Ok(self.list(list_name)?.lock().await.len())
    }

    /// Tokens of the players waiting in the current cycle, in arrival order
    pub async fn waiting_tokens(&self, list_name: &str) -> Result<Vec<String>> {
        let list = self.list(list_name)?.lock().await;
        Ok(list.entries.iter().map(|e| e.token.clone()).collect())
    }

    pub async fn capacity(&self, list_name: &str) -> Result<usize> {
        Ok(self.list(list_name)?.lock().await.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::BriscolaDealer;

    fn manager(capacity: usize) -> WaitingListManager {
        WaitingListManager::new(
            &[WaitingListConfig::new("TEST", capacity)],
            Arc::new(BriscolaDealer::seeded(1)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_join_reserves_game_id() {
        let manager = manager(3);
        let a = manager.add_player("TEST", "a", "a").await.unwrap();
        let b = manager.add_player("TEST", "b", "b").await.unwrap();
        assert_eq!(a.game_id, b.game_id);

        match manager.try_start_game("TEST", &a).await.unwrap() {
            StartOutcome::AwaitingPlayers { game_id } => assert_eq!(game_id, a.game_id),
            other => panic!("expected AwaitingPlayers, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_cycle_gets_fresh_game_id() {
        let manager = manager(1);
        let a = manager.add_player("TEST", "a", "a").await.unwrap();
        manager.try_start_game("TEST", &a).await.unwrap();
        let b = manager.add_player("TEST", "b", "b").await.unwrap();
        assert_ne!(a.game_id, b.game_id);
    }

    #[test]
    fn test_manager_rejects_bad_config() {
        let engine: Arc<dyn GameEngine> = Arc::new(BriscolaDealer::new());
        assert!(
            WaitingListManager::new(&[WaitingListConfig::new("X", 0)], Arc::clone(&engine))
                .is_err()
        );
        assert!(WaitingListManager::new(
            &[WaitingListConfig::new("X", 2), WaitingListConfig::new("X", 3)],
            engine
        )
        .is_err());
    }

    #[test]
    fn test_manager_rejects_capacity_beyond_engine() {
        let engine: Arc<dyn GameEngine> = Arc::new(BriscolaDealer::new());
        let err = WaitingListManager::new(&[WaitingListConfig::new("BIG", 14)], Arc::clone(&engine))
            .err()
            .unwrap();
        assert!(matches!(err, LobbyError::ConfigError(_)));
        assert!(WaitingListManager::new(&[WaitingListConfig::new("BIG", 13)], engine).is_ok());
    }

    #[tokio::test]
    async fn test_waiting_players_spans_lists() {
        let manager = WaitingListManager::new(
            &[WaitingListConfig::new("DUO", 2), WaitingListConfig::new("TRIO", 3)],
            Arc::new(BriscolaDealer::seeded(1)),
        )
        .unwrap();
        manager.add_player("DUO", "a", "a").await.unwrap();
        manager.add_player("TRIO", "b", "b").await.unwrap();

        let waiting = manager.waiting_players().await;
        assert!(waiting.contains("a"));
        assert!(waiting.contains("b"));
        assert_eq!(waiting.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ticket_is_internal_error() {
        let manager = manager(2);
        let ticket = MatchmakingTicket {
            list_name: "TEST".to_string(),
            player_id: "ghost".to_string(),
            token: "ghost".to_string(),
            game_id: "nope".to_string(),
        };
        let err = manager.try_start_game("TEST", &ticket).await.unwrap_err();
        assert!(!err.is_client_error());
    }
}
