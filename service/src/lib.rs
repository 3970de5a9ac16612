use config::Config;
use sse::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub relay_manager: Arc<Manager>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, relay_manager: &Arc<Manager>) -> Self {
        Self {
            relay_manager: Arc::clone(relay_manager),
            config: app_config,
        }
    }

    pub fn relay_manager_ref(&self) -> &Manager {
        self.relay_manager.as_ref()
    }
}
