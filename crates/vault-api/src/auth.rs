use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use vault_db::Database;
use vault_db::users::NewUser;
use vault_storage::{ObjectStore, PRESIGN_TTL};
use vault_types::api::{
    Claims, LoginRequest, LoginResponse, PresignUploadRequest, PresignUploadResponse, RefreshRequest,
    RegisterRequest, Session, TokenKind,
};
use vault_types::keys::avatar_key;

use crate::blocking;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
}

const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if username.is_empty() || username.len() > 32 {
        return Err(ApiError::validation("username must be 1-32 characters"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("invalid email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("password must be at least 6 characters"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(ApiError::server)?
        .to_string();

    let db = state.db.clone();
    let user = blocking(move || {
        db.create_user(NewUser {
            username: &username,
            email: &email,
            password_hash: Some(&password_hash),
            federated_uid: None,
        })
    })
    .await?;
    info!(user_id = %user.id, "user registered");

    let session = issue_session(&state, user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            session,
            user: user.to_out(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid email or password".into());

    let db = state.db.clone();
    let email = req.email.trim().to_lowercase();
    let user = blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid)?;

    // Federated-only accounts have no password to check against.
    let stored = user.password.as_deref().ok_or_else(invalid)?;
    let parsed_hash = PasswordHash::new(stored).map_err(ApiError::server)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let session = issue_session(&state, user.id)?;
    Ok(Json(LoginResponse {
        session,
        user: user.to_out(),
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = verify_token(&state.jwt_secret, &req.refresh_token)
        .filter(|c| c.typ == TokenKind::Refresh)
        .ok_or_else(|| ApiError::Unauthorized("invalid refresh token".into()))?;

    Ok(Json(issue_session(&state, claims.sub)?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = blocking(move || db.get_user_by_id(claims.sub))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".into()))?;
    Ok(Json(user.to_out()))
}

/// Presigned PUT for the caller's avatar. The upload is picked up by
/// ingestion, which sets the public avatar URL.
pub async fn presign_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PresignUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.content_type.starts_with("image/") {
        return Err(ApiError::validation("only image files are allowed"));
    }

    let key = avatar_key(claims.sub);
    let url = state.store.presigned_put_url(&key, &req.content_type, PRESIGN_TTL)?;
    Ok(Json(PresignUploadResponse { url, key }))
}

fn issue_session(state: &AppStateInner, user_id: Uuid) -> Result<Session, ApiError> {
    Ok(Session {
        token: create_token(&state.jwt_secret, user_id, TokenKind::Access, state.access_token_ttl)
            .map_err(ApiError::server)?,
        refresh: create_token(&state.jwt_secret, user_id, TokenKind::Refresh, state.refresh_token_ttl)
            .map_err(ApiError::server)?,
    })
}

pub fn create_token(secret: &str, user_id: Uuid, typ: TokenKind, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        typ,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Signature and expiry check only; callers decide which kinds they accept.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
