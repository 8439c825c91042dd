use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use briscola_lobby::auth::{HeaderSessionProvider, SessionProvider};
use briscola_lobby::config::ServerConfig;
use briscola_lobby::core::Lobby;
use briscola_lobby::handlers::routes;

#[tokio::main]
async fn main() {
    // Load .env before logging so RUST_LOG can come from it
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, long_poll_timeout={:?}",
        config.host, config.port, config.long_poll_timeout
    );

    let lobby = match Lobby::new(&config) {
        Ok(lobby) => Arc::new(lobby),
        Err(e) => {
            error!("Failed to initialize lobby: {}", e);
            std::process::exit(1);
        }
    };

    Arc::clone(&lobby).start_cleanup_task(config.cleanup_interval, config.game_ttl);

    let sessions: Arc<dyn SessionProvider> = Arc::new(HeaderSessionProvider);
    let routes = routes(lobby, sessions);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Briscola lobby on {}", addr);
    warp::serve(routes).run(addr).await;
}
