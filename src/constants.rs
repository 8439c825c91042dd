// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8082;
pub const START_PATH: &str = "start";
pub const PLAY_PATH: &str = "play";
pub const HEALTH_PATH: &str = "health";

// Matchmaking defaults
pub const DEFAULT_WAITING_LISTS: &str = "TEST:2";
pub const SUBSCRIPTION_TOKEN_LENGTH: usize = 32;

// Long-poll and feed defaults
pub const DEFAULT_LONG_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FEED_CAPACITY: usize = 8;

// Housekeeping defaults
pub const DEFAULT_GAME_TTL_SECS: u64 = 2 * 60 * 60;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

// Request identity
pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "sessionID";
pub const SUBSCRIPTION_ID_HEADER: &str = "x-subscription-id";
pub const GAME_ID_HEADER: &str = "x-game-id";
