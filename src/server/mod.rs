use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::config::{self, AppConfig};
use crate::source::{HttpPageSource, PageSource};
use crate::storage::SqliteStore;

pub mod error;
pub mod routes;

pub use error::ApiError;

/// Server state shared by every handler
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub source: Arc<dyn PageSource>,
    /// Pages walked per ingestion run
    pub pages: u32,
    pub max_range: i64,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, source: Arc<dyn PageSource>, pages: u32, max_range: i64) -> Self {
        Self {
            store,
            source,
            pages,
            max_range,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::ingest))
        .route("/ingest", get(routes::ingest).post(routes::ingest))
        .route("/getRange", get(routes::get_range))
        .route("/getOne", get(routes::get_one))
        .route("/delete", delete(routes::delete_one))
        .route("/stats", get(routes::stats))
        .route("/consistency", get(routes::consistency))
        .route("/health", get(routes::health))
        .with_state(state)
}

pub async fn start_server(config: &AppConfig) -> anyhow::Result<()> {
    config::ensure_db_dir(&config.database)?;
    let store = Arc::new(SqliteStore::open(&config.database)?);
    let source = HttpPageSource::new(config.upstream_url.clone(), config.source_options())?;
    let state = Arc::new(AppState::new(store, Arc::new(source), config.pages, config.max_range));

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        database = %config.database.display(),
        upstream = %config.upstream_url,
        "starting server"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
