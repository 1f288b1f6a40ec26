mod auth;
mod config;
mod db;
mod middleware;
mod models;
mod notify;
mod routes;
mod store;
mod ws;

use axum::http::{HeaderName, Method};
use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub gateway: Arc<ws::gateway::GatewayState>,
    pub store: store::MessageStore,
    pub notifier: Option<Arc<notify::SmsNotifier>>,
}

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carechat_server=info".into()),
        )
        .init();

    let config = Config::from_env();

    // Initialize database
    let pool = db::init_pool(&config.database_path)
        .await
        .expect("Failed to initialize database");

    let notifier = notify::SmsNotifier::from_config(&config).map(Arc::new);
    if notifier.is_none() {
        tracing::info!("SMS gateway not configured, offline notifications disabled");
    }

    let state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        gateway: Arc::new(ws::gateway::GatewayState::new()),
        store: store::MessageStore::new(pool),
        notifier,
    });

    // Build router
    let app = routes::build_router(state.clone()).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                HeaderName::from_static("content-type"),
                HeaderName::from_static("authorization"),
            ])
            .allow_credentials(true),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");

    tracing::info!("CareChat server running on {}", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
