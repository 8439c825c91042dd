//! Server configuration module
//! Handles dynamic configuration parameters for the lobby server

use crate::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_FEED_CAPACITY, DEFAULT_GAME_TTL_SECS, DEFAULT_HOST,
    DEFAULT_LONG_POLL_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_WAITING_LISTS,
};
use crate::error::{LobbyError, Result};
use std::collections::HashSet;
use std::env;
use std::time::Duration;

/// A matchmaking queue declared at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingListConfig {
    pub name: String,
    pub capacity: usize,
}

impl WaitingListConfig {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Waiting lists created at startup
    pub waiting_lists: Vec<WaitingListConfig>,
    /// How long a long-poll request is held before answering "no event yet"
    pub long_poll_timeout: Duration,
    /// Maximum number of undelivered events kept per feed
    pub feed_capacity: usize,
    /// Started games older than this are retired with their feeds
    pub game_ttl: Duration,
    /// Interval between housekeeping sweeps
    pub cleanup_interval: Duration,
}

impl ServerConfig {
    /// Configuration for tests: short timeouts, one TEST list of two players
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            waiting_lists: vec![WaitingListConfig::new("TEST", 2)],
            long_poll_timeout: Duration::from_millis(500),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            game_ttl: Duration::from_secs(DEFAULT_GAME_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    /// Replace the configured waiting lists
    pub fn with_waiting_lists(mut self, waiting_lists: Vec<WaitingListConfig>) -> Self {
        self.waiting_lists = waiting_lists;
        self
    }

    /// Replace the long-poll timeout
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Parse a waiting list declaration such as `TEST:2,QUAD:4`
    pub fn parse_waiting_lists(raw: &str) -> Result<Vec<WaitingListConfig>> {
        let mut lists = Vec::new();
        let mut seen = HashSet::new();

        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, capacity) = item.split_once(':').ok_or_else(|| {
                LobbyError::ConfigError(format!(
                    "Waiting list '{}' must be declared as NAME:CAPACITY",
                    item
                ))
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' has an empty name",
                    item
                )));
            }

            let capacity: usize = capacity.trim().parse().map_err(|_| {
                LobbyError::ConfigError(format!(
                    "Waiting list '{}' has an invalid capacity",
                    name
                ))
            })?;

            if !seen.insert(name.to_string()) {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' declared twice",
                    name
                )));
            }

            lists.push(WaitingListConfig::new(name, capacity));
        }

        if lists.is_empty() {
            return Err(LobbyError::ConfigError(
                "At least one waiting list must be configured".to_string(),
            ));
        }

        Ok(lists)
    }

    /// Check the values that cannot be expressed by the types alone
    pub fn validate(&self) -> Result<()> {
        for list in &self.waiting_lists {
            if list.capacity == 0 {
                return Err(LobbyError::ConfigError(format!(
                    "Waiting list '{}' must have a positive capacity",
                    list.name
                )));
            }
        }

        if self.long_poll_timeout.is_zero() {
            return Err(LobbyError::ConfigError(
                "Long-poll timeout must be positive".to_string(),
            ));
        }

        if self.feed_capacity == 0 {
            return Err(LobbyError::ConfigError(
                "Feed capacity must hold at least one event".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(LobbyError::ConfigError(
                "Cleanup interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("BRISCOLA_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("BRISCOLA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let waiting_lists = env::var("BRISCOLA_WAITING_LISTS")
            .unwrap_or_else(|_| DEFAULT_WAITING_LISTS.to_string());
        let waiting_lists = Self::parse_waiting_lists(&waiting_lists)?;

        let long_poll_secs = env::var("BRISCOLA_LONG_POLL_TIMEOUT")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_LONG_POLL_TIMEOUT_SECS);

        let feed_capacity = env::var("BRISCOLA_FEED_CAPACITY")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_FEED_CAPACITY);

        let game_ttl_secs = env::var("BRISCOLA_GAME_TTL")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_GAME_TTL_SECS);

        let cleanup_secs = env::var("BRISCOLA_CLEANUP_INTERVAL")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS);

        let config = Self {
            host,
            port,
            waiting_lists,
            long_poll_timeout: Duration::from_secs(long_poll_secs),
            feed_capacity,
            game_ttl: Duration::from_secs(game_ttl_secs),
            cleanup_interval: Duration::from_secs(cleanup_secs),
        };

        config.validate()?;
        Ok(config)
    }
}
