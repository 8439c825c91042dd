use rand::distributions::Alphanumeric;
use rand::Rng;

/// Mints the opaque identifiers handed to players.
///
/// A token doubles as player id, subscription id and unicast feed key, so it
/// must be unguessable and unique for the lifetime of the process.
pub trait TokenIssuer: Send + Sync {
    fn new_token(&self, length: usize) -> String;
}

/// Random alphanumeric tokens from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn new_token(&self, length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
