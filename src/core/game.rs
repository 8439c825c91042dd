//! Game engine boundary
//!
//! The lobby only needs a game engine to turn a full waiting list into a
//! started game: a player order, a hand per player and the briscola card.
//! Rules of play live elsewhere; `BriscolaDealer` is the default engine and
//! only deals.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{LobbyError, Result};

/// Cards dealt to each player at the start of a game
pub const HAND_SIZE: usize = 3;

/// Cards in the Italian deck
pub const DECK_SIZE: usize = 40;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Coins,
    Cups,
    Swords,
    Batons,
}

/// A card of the 40-card Italian deck; `value` runs from 1 (ace) to 10 (king)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub value: u8,
}

impl Card {
    pub fn new(suit: Suit, value: u8) -> Self {
        Self { suit, value }
    }
}

pub fn full_deck() -> Vec<Card> {
    let suits = [Suit::Coins, Suit::Cups, Suit::Swords, Suit::Batons];
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in suits {
        for value in 1..=10 {
            deck.push(Card::new(suit, value));
        }
    }
    deck
}

/// A started game as seen by the lobby. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub game_id: String,
    pub ordered_players: Vec<String>,
    pub hands: HashMap<String, Vec<Card>>,
    pub briscola: Card,
    pub started_at: DateTime<Utc>,
}

impl GameSession {
    /// The player expected to act first
    pub fn first_player(&self) -> Option<&str> {
        self.ordered_players.first().map(String::as_str)
    }

    pub fn player_cards(&self, player_id: &str) -> Option<&[Card]> {
        self.hands.get(player_id).map(Vec::as_slice)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.ordered_players.iter().any(|p| p == player_id)
    }
}

/// Creates game state for a set of matched players.
///
/// Called inside the waiting list's critical section, so implementations
/// must not block or do I/O.
pub trait GameEngine: Send + Sync {
    fn create_game(&self, game_id: &str, players: &[String]) -> Result<GameSession>;

    /// Largest table this engine can start; waiting lists above it are refused
    fn max_players(&self) -> usize {
        usize::MAX
    }
}

/// Default engine: shuffles a fresh deck and deals in join order
pub struct BriscolaDealer {
    rng: Mutex<StdRng>,
}

impl BriscolaDealer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic dealer for tests and replays
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for BriscolaDealer {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEngine for BriscolaDealer {
    fn max_players(&self) -> usize {
        // One extra card is turned up as briscola
        (DECK_SIZE - 1) / HAND_SIZE
    }

    fn create_game(&self, game_id: &str, players: &[String]) -> Result<GameSession> {
        if players.is_empty() {
            return Err(LobbyError::EngineError(
                "Cannot deal a game without players".to_string(),
            ));
        }

        if players.len() > self.max_players() {
            return Err(LobbyError::EngineError(format!(
                "Deck too small for {} players",
                players.len()
            )));
        }

        let mut deck = full_deck();
        deck.shuffle(&mut *self.rng.lock());

        let mut cards = deck.into_iter();
        let mut hands = HashMap::with_capacity(players.len());
        for player in players {
            let hand: Vec<Card> = cards.by_ref().take(HAND_SIZE).collect();
            hands.insert(player.clone(), hand);
        }

        let briscola = cards
            .next()
            .ok_or_else(|| LobbyError::EngineError("Deck exhausted before briscola".to_string()))?;

        log::debug!(
            "Dealt game {} for {} players, briscola {:?}",
            game_id,
            players.len(),
            briscola
        );

        Ok(GameSession {
            game_id: game_id.to_string(),
            ordered_players: players.to_vec(),
            hands,
            briscola,
            started_at: Utc::now(),
        })
    }
}
