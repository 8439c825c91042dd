//! Request handlers for the lobby endpoints

pub mod http;

// Re-export the route builder
pub use http::routes;
