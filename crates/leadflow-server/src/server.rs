use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use leadflow_engine::{AssignmentEngine, CacheConfig, LeadQuery, QueryCache, QueryConfig};
use leadflow_store::Database;

use crate::{automations, leads};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub cache: CacheConfig,
    pub query: QueryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9200,
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub query: Arc<LeadQuery>,
    pub cache: Arc<QueryCache>,
    pub engine: Arc<AssignmentEngine>,
}

impl AppState {
    pub fn new(db: Database, config: &ServerConfig) -> Self {
        Self {
            query: Arc::new(LeadQuery::new(db.clone(), config.query)),
            cache: Arc::new(QueryCache::new(config.cache)),
            engine: Arc::new(AssignmentEngine::new(db.clone())),
            db,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/leads",
            get(leads::list)
                .post(leads::create)
                .patch(leads::bulk_update_stage)
                .delete(leads::bulk_delete),
        )
        .route("/leads/{phone}", get(leads::get_lead))
        .route(
            "/automations",
            get(automations::get).post(automations::activate),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle holding the bound port.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(db, &config);
    let router = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "leadflow server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "healthy" }))
}
