//! Server state.

use std::time::{Duration, Instant};

use super::config::ServerConfig;
use crate::registry::ModelRegistry;

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded translators, read-only for the process lifetime
    pub registry: ModelRegistry,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state around an already loaded registry
    pub fn new(config: ServerConfig, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
