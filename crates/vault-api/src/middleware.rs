use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use vault_types::api::TokenKind;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;

/// Extract and validate an access token from the Authorization header.
/// Refresh tokens are refused here.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let unauthorized = || ApiError::Unauthorized("missing or invalid token".into());

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    let claims = verify_token(&state.jwt_secret, token)
        .filter(|c| c.typ == TokenKind::Access)
        .ok_or_else(unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
