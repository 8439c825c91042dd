//! Core matchmaking and event delivery

pub mod event;
pub mod feed;
pub mod game;
pub mod lobby;
pub mod long_poll;
pub mod waiting_list;

// Re-export main components for convenience
pub use event::{Event, PlayEvent};
pub use feed::{FeedRegistry, PollOutcome, Subscription};
pub use game::{BriscolaDealer, Card, GameEngine, GameSession, Suit};
pub use lobby::{Lobby, LongPollReply};
pub use long_poll::{LongPollCoordinator, PollRequest};
pub use waiting_list::{MatchmakingTicket, StartOutcome, WaitingListManager};
