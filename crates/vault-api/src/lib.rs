pub mod attachments;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod notes;
pub mod shares;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tracing::error;

use auth::AppState;
use error::ApiError;
use middleware::require_auth;

/// Run a store call off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> vault_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::server(e)
        })?
        .map_err(ApiError::from)
}

/// Auth, notes, attachments and shares. Everything except register, login
/// and refresh requires an access token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/me/avatar", post(auth::presign_avatar))
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route("/notes/deleted", get(notes::list_deleted_notes))
        .route("/notes/shared", get(shares::shared_with_me))
        .route("/notes/attachments", get(attachments::list_attachments))
        .route(
            "/notes/{note_id}",
            get(notes::get_note).put(notes::edit_note).delete(notes::delete_note),
        )
        .route("/notes/{note_id}/restore", post(notes::restore_note))
        .route("/notes/{note_id}/attachments", post(attachments::presign_upload))
        .route(
            "/notes/{note_id}/attachments/{attachment_id}",
            get(attachments::download_url).delete(attachments::delete_attachment),
        )
        .route("/notes/{note_id}/share", post(shares::share_note).get(shares::list_shares))
        .route("/notes/{note_id}/share/{user_id}", delete(shares::revoke_share))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    public_routes.merge(protected_routes).with_state(state)
}
