//! Join and play orchestration
//!
//! Ties the waiting lists to the feeds: a join registers the player's and
//! the game's feeds, publishes the join or start notifications and parks the
//! request on the long-poll coordinator.
//!
//! A join notice only reaches players already blocked on the game feed; the
//! joiner itself keeps waiting for the game to start.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;

use crate::auth::{RandomTokenIssuer, TokenIssuer};
use crate::config::ServerConfig;
use crate::constants::SUBSCRIPTION_TOKEN_LENGTH;
use crate::core::event::{Event, PlayEvent};
use crate::core::feed::{FeedRegistry, PollOutcome};
use crate::core::game::{BriscolaDealer, GameEngine, GameSession};
use crate::core::long_poll::{LongPollCoordinator, PollRequest};
use crate::core::waiting_list::{StartOutcome, WaitingListManager};
use crate::error::{LobbyError, Result};

/// Result of a long-poll handled by the lobby
#[derive(Debug, Clone, PartialEq)]
pub struct LongPollReply {
    /// The caller's subscription id, also its player id
    pub subscription_id: String,
    /// Broadcast feed of the caller's game, when known
    pub game_id: Option<String>,
    pub outcome: PollOutcome,
}

pub struct Lobby {
    waiting_lists: Arc<WaitingListManager>,
    feeds: Arc<FeedRegistry>,
    coordinator: LongPollCoordinator,
    tokens: Arc<dyn TokenIssuer>,
    /// player id -> the game the player was matched into
    player_games: RwLock<HashMap<String, Arc<GameSession>>>,
    /// subscription id -> session that obtained it
    owners: RwLock<HashMap<String, String>>,
}

impl Lobby {
    /// Lobby with the default dealer and random tokens
    pub fn new(config: &ServerConfig) -> Result<Self> {
        Self::with_components(
            config,
            Arc::new(BriscolaDealer::new()),
            Arc::new(RandomTokenIssuer),
        )
    }

    pub fn with_components(
        config: &ServerConfig,
        engine: Arc<dyn GameEngine>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Result<Self> {
        config.validate()?;

        let waiting_lists = Arc::new(WaitingListManager::new(&config.waiting_lists, engine)?);
        let feeds = Arc::new(FeedRegistry::with_capacity(config.feed_capacity));
        let coordinator = LongPollCoordinator::new(Arc::clone(&feeds), config.long_poll_timeout);

        log::info!(
            "Lobby ready with waiting lists {:?}",
            waiting_lists.list_names()
        );

        Ok(Self {
            waiting_lists,
            feeds,
            coordinator,
            tokens,
            player_games: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        })
    }

    pub fn feeds(&self) -> &Arc<FeedRegistry> {
        &self.feeds
    }

    pub fn waiting_lists(&self) -> &Arc<WaitingListManager> {
        &self.waiting_lists
    }

    /// Join a waiting list and long-poll for the first notification
    pub async fn start(
        &self,
        session_id: Option<&str>,
        list_name: Option<&str>,
    ) -> Result<LongPollReply> {
        let session_id = non_empty(session_id).ok_or(LobbyError::MissingSession)?;
        let list_name = non_empty(list_name).ok_or(LobbyError::MissingListName)?;
        if !self.waiting_lists.has_list(list_name) {
            return Err(LobbyError::UnknownList(list_name.to_string()));
        }

        let player_id = self.tokens.new_token(SUBSCRIPTION_TOKEN_LENGTH);

        let ticket = self
            .waiting_lists
            .add_player(list_name, &player_id, &player_id)
            .await?;
        self.owners
            .write()?
            .insert(player_id.clone(), session_id.to_string());

        let outcome = self
            .waiting_lists
            .try_start_game(list_name, &ticket)
            .await
            .map_err(|e| {
                log::error!("Failed to start game for list {}: {}", list_name, e);
                e
            })?;

        let request = PollRequest::unicast(session_id, &player_id).with_broadcast(&ticket.game_id);
        self.feeds.ensure(&player_id);
        self.feeds.ensure(&ticket.game_id);
        // Register before publishing so an announcer sees its own start broadcast
        let subscription = self.coordinator.register(&request);

        match outcome {
            StartOutcome::AwaitingPlayers { game_id } => {
                log::debug!("Player {} awaiting others in game {}", player_id, game_id);
                self.feeds.publish_live(
                    Event::new(
                        game_id,
                        PlayEvent::message(format!(
                            "{} joined. Waiting for more players",
                            player_id
                        )),
                    ),
                    Some(subscription.id()),
                );
            }
            StartOutcome::Started { session, announce } => {
                log::debug!("Player {} joined started game {}", player_id, session.game_id);
                if announce {
                    self.announce_game(&session)?;
                }
            }
        }

        let outcome = self.coordinator.wait(&request, subscription).await;

        Ok(LongPollReply {
            subscription_id: player_id,
            game_id: Some(ticket.game_id),
            outcome,
        })
    }

    /// Long-poll the caller's personal feed during a game
    pub async fn play(
        &self,
        session_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<LongPollReply> {
        let session_id = non_empty(session_id).ok_or(LobbyError::MissingSession)?;
        let subscription_id = non_empty(subscription_id).ok_or(LobbyError::MissingSubscription)?;

        let owned_elsewhere = {
            let owners = self.owners.read()?;
            owners
                .get(subscription_id)
                .map_or(false, |owner| owner != session_id)
        };
        if owned_elsewhere {
            log::warn!(
                "Session {} tried to poll subscription {} owned by another session",
                session_id,
                subscription_id
            );
            return Err(LobbyError::SubscriptionMismatch(subscription_id.to_string()));
        }

        let request = PollRequest::unicast(session_id, subscription_id);
        let outcome = self.coordinator.listen(&request).await;

        // Looked up after the wait, the game may have started meanwhile
        let game_id = self
            .game_for_player(subscription_id)?
            .map(|session| session.game_id.clone());

        Ok(LongPollReply {
            subscription_id: subscription_id.to_string(),
            game_id,
            outcome,
        })
    }

    /// Record the new game and publish its opening notifications
    fn announce_game(&self, session: &Arc<GameSession>) -> Result<()> {
        {
            let mut games = self.player_games.write()?;
            for player in &session.ordered_players {
                games.insert(player.clone(), Arc::clone(session));
            }
        }

        let first = session.first_player().ok_or_else(|| {
            LobbyError::InternalError(format!("Game {} has no players", session.game_id))
        })?;
        let last_joined = session.ordered_players.last().map_or(first, String::as_str);
        let cards = session
            .player_cards(first)
            .ok_or_else(|| {
                LobbyError::InternalError(format!(
                    "Game {} dealt no cards to {}",
                    session.game_id, first
                ))
            })?
            .to_vec();

        // Hand first: the first player may be blocked on the game feed too
        self.feeds.publish(Event::new(
            first,
            PlayEvent::hand(cards, session.briscola, true),
        ));
        self.feeds.publish(Event::new(
            session.game_id.clone(),
            PlayEvent::message(format!(
                "{} joined. Ready to play. {} begins.",
                last_joined, first
            )),
        ));

        log::info!(
            "Game {} started, {} acts first",
            session.game_id,
            first
        );
        Ok(())
    }

    /// The game a player was matched into, if it has started
    pub fn game_for_player(&self, player_id: &str) -> Result<Option<Arc<GameSession>>> {
        Ok(self.player_games.read()?.get(player_id).cloned())
    }

    /// Session that obtained a subscription, if it is still tracked
    pub fn subscription_owner(&self, subscription_id: &str) -> Result<Option<String>> {
        Ok(self.owners.read()?.get(subscription_id).cloned())
    }

    /// Forget a game and retire its feeds. Returns false for unknown games.
    pub async fn finish_game(&self, game_id: &str) -> Result<bool> {
        let Some(session) = self.waiting_lists.retire_game(game_id).await else {
            return Ok(false);
        };

        {
            let mut games = self.player_games.write()?;
            let mut owners = self.owners.write()?;
            for player in &session.ordered_players {
                games.remove(player);
                owners.remove(player);
            }
        }

        self.feeds.retire(game_id);
        for player in &session.ordered_players {
            self.feeds.retire(player);
        }

        log::info!("Game {} retired", game_id);
        Ok(true)
    }

    /// Retire every game started more than `ttl` ago
    pub async fn retire_stale_games(&self, ttl: Duration) -> Result<usize> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LobbyError::InternalError(format!("Invalid game TTL: {}", e)))?;
        let cutoff = Utc::now() - ttl;

        let mut retired = 0;
        for game_id in self.waiting_lists.games_started_before(cutoff).await {
            if self.finish_game(&game_id).await? {
                retired += 1;
            }
        }
        Ok(retired)
    }

    /// Drop ownership records of players that are neither waiting, in a
    /// game, nor holding a live feed
    pub async fn prune_subscriptions(&self) -> Result<usize> {
        let waiting = self.waiting_lists.waiting_players().await;

        let games = self.player_games.read()?;
        let mut owners = self.owners.write()?;
        let before = owners.len();
        owners.retain(|player, _| {
            waiting.contains(player) || games.contains_key(player) || self.feeds.contains(player)
        });
        Ok(before - owners.len())
    }

    /// Start periodic retirement of old games, idle feeds and orphaned
    /// subscriptions
    pub fn start_cleanup_task(self: Arc<Self>, cleanup_interval: Duration, game_ttl: Duration) {
        let lobby = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = interval(cleanup_interval);
            loop {
                interval.tick().await;
                match lobby.retire_stale_games(game_ttl).await {
                    Ok(0) => {}
                    Ok(count) => log::info!("Retired {} stale games", count),
                    Err(e) => log::error!("Failed to retire stale games: {}", e),
                }
                let idle = lobby.feeds.retire_idle(game_ttl);
                if idle > 0 {
                    log::debug!("Retired {} idle feeds", idle);
                }
                match lobby.prune_subscriptions().await {
                    Ok(0) => {}
                    Ok(count) => log::debug!("Pruned {} orphaned subscriptions", count),
                    Err(e) => log::error!("Failed to prune subscriptions: {}", e),
                }
            }
        });
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
