//! Request identity and subscription token issuance

pub mod session;
pub mod token;

// Re-export main components
pub use session::{HeaderSessionProvider, SessionProvider};
pub use token::{RandomTokenIssuer, TokenIssuer};
