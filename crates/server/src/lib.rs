pub mod auth;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod store;
pub mod ws;

use config::Config;
use std::sync::Arc;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub gateway: Arc<ws::gateway::GatewayState>,
    pub store: store::MessageStore,
    pub notifier: Option<Arc<notify::SmsNotifier>>,
}
