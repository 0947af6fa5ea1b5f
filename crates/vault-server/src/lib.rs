pub mod config;
pub mod events;
pub mod objects;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vault_api::auth::AppState;
use vault_ingest::Ingestor;
use vault_storage::LocalObjectStore;

/// Largest request body accepted, presigned uploads included. Anything over
/// the ingestion limit that fits here is removed by the size guard.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// State for the object and event routes.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<LocalObjectStore>,
    pub ingestor: Arc<Ingestor>,
    pub ingest_token: Option<String>,
}

/// The API plus object plumbing, with CORS, tracing and the body limit.
pub fn router(api: AppState, server: ServerState) -> Router {
    let plumbing = Router::new()
        .route("/objects/{*key}", put(objects::put_object).get(objects::get_object))
        .route("/public/avatars/{user_id}", get(objects::public_avatar))
        .route("/events", post(events::ingest_events))
        .route("/health", get(health))
        .with_state(server);

    Router::new()
        .merge(vault_api::router(api))
        .merge(plumbing)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}
