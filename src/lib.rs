pub mod aggregator;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestor;
pub mod models;
pub mod month;
pub mod normaliser;
pub mod store;
pub mod validator;

use std::sync::Arc;

use config::EngineConfig;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<EngineConfig>,
}
