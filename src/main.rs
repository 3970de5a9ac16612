use log::{error, info};
use service::{config::Config, logging::Logger, AppState};
use sse::pubsub::redis::RedisBackend;
use sse::Manager;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!("Relaying test status from {}", config.redis_url());

    let backend = match RedisBackend::new(config.redis_url()) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            error!("Invalid Redis configuration: {e}");
            std::process::exit(1);
        }
    };
    let relay_manager = Arc::new(Manager::new(backend, config.relay_settings()));

    let app_state = AppState::new(config, &relay_manager);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
