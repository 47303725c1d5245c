use axum::{Router, routing::delete, routing::get, routing::post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

use travel_ledger_engine::config::EngineConfig;
use travel_ledger_engine::store::Store;
use travel_ledger_engine::{handlers, ingestor, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("ENGINE_CONFIG").unwrap_or_else(|_| "./engine.toml".to_string());
    let config = EngineConfig::load(&config_path)?;

    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = rolling::daily(&config.log_dir, "engine.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("travel_ledger_engine=debug,tower_http=debug")
        }))
        .with_writer(non_blocking)
        .init();

    std::fs::create_dir_all(&config.upload_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(Store::open(config.sqlite_path())?);
    tracing::info!("store opened at {}", config.sqlite_path().display());

    ingestor::spawn_progress_sweep(store.clone());

    let max_upload_size_bytes = config.max_upload_size_mb as usize * 1024 * 1024;

    let config = Arc::new(config);
    let allowed_origins = config.allowed_origins.clone();
    let state = AppState { store, config };

    let cors = if allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    let app = Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route("/progress/{task_id}", get(handlers::upload::progress))
        .route("/months", get(handlers::months::list_months))
        .route("/months/{m}", delete(handlers::months::delete_month))
        .route("/analyze", post(handlers::analyze::analyze))
        .route("/projects", get(handlers::projects::list_projects))
        .route("/projects/{code}/orders", get(handlers::projects::project_orders))
        .route("/departments/hierarchy", get(handlers::departments::hierarchy))
        .route("/departments/list", get(handlers::departments::list))
        .route("/departments/details", get(handlers::departments::details))
        .route("/departments/level1/statistics", get(handlers::departments::level1_statistics))
        .route("/departments/level2/statistics", get(handlers::departments::level2_statistics))
        .route("/anomalies", get(handlers::anomalies::list_anomalies))
        .route("/healthz", get(handlers::health::healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(max_upload_size_bytes))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("travel-ledger-engine listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
