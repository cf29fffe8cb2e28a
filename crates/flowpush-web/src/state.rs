//! Application state.

use flowpush_core::auth::{self, TokenValidator};
use flowpush_core::config::Config;
use flowpush_core::Hub;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub validator: Arc<dyn TokenValidator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state with an explicit validator. Spawns the hub worker.
    pub fn new(config: Config, validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            hub: Hub::new(),
            validator,
            config: Arc::new(config),
        }
    }

    /// Build state with the validator described by the config.
    pub fn from_config(config: Config) -> Self {
        let validator = auth::from_config(&config);
        Self::new(config, validator)
    }
}
