//! Briscola lobby - matchmaking and long-poll event delivery
//!
//! This library groups anonymous players into fixed-size games and
//! delivers game notifications through long-held HTTP responses.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
