pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod ports;
pub mod routes;
pub mod store;
pub mod sweeper;
pub mod telegram;

use std::sync::Arc;

use config::Config;
use engine::Engine;
use ports::CallbackAnswerer;
use store::Stores;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub stores: Stores,
    pub config: Arc<Config>,
    pub callbacks: Arc<dyn CallbackAnswerer>,
}
