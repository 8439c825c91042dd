use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    // Request validation errors
    MissingSession,
    MissingListName,
    MissingSubscription,
    SubscriptionMismatch(String),

    // Matchmaking conflicts
    UnknownList(String),
    DuplicatePlayer(String),

    // Internal errors
    EngineError(String),
    InternalError(String),

    // Configuration errors
    ConfigError(String),
}

impl LobbyError {
    /// Client-caused errors map to 400, everything else to 500
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSession
                | Self::MissingListName
                | Self::MissingSubscription
                | Self::SubscriptionMismatch(_)
                | Self::UnknownList(_)
                | Self::DuplicatePlayer(_)
        )
    }

    /// Stable machine-readable code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSession => "missing_session",
            Self::MissingListName => "missing_game_type",
            Self::MissingSubscription => "missing_subscription",
            Self::SubscriptionMismatch(_) => "subscription_mismatch",
            Self::UnknownList(_) => "unknown_game_type",
            Self::DuplicatePlayer(_) => "duplicate_player",
            Self::EngineError(_) => "engine_error",
            Self::InternalError(_) => "internal_error",
            Self::ConfigError(_) => "config_error",
        }
    }
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSession => write!(f, "Missing sessionID"),
            Self::MissingListName => write!(f, "Missing game type"),
            Self::MissingSubscription => write!(f, "Missing subscriptionID"),
            Self::SubscriptionMismatch(id) => {
                write!(f, "Subscription {} belongs to another session", id)
            }
            Self::UnknownList(name) => write!(f, "Unknown waiting list: {}", name),
            Self::DuplicatePlayer(id) => write!(f, "Player {} already in waiting list", id),
            Self::EngineError(msg) => write!(f, "Game engine error: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for LobbyError {}

// Poisoned std locks surface as internal errors
impl<T> From<PoisonError<T>> for LobbyError {
    fn from(err: PoisonError<T>) -> Self {
        LobbyError::InternalError(format!("Lock poisoned: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, LobbyError>;
