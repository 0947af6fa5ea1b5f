//! HTTP face of the local bucket: presigned PUT/GET and the public avatar
//! alias.

use axum::{
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use vault_storage::{LocalObjectStore, Method, StorageError};
use vault_types::keys::avatar_key;

use crate::ServerState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub method: String,
    pub expires: i64,
    pub signature: String,
}

/// PUT /objects/{*key}: upload through a presigned URL. The request's
/// Content-Type must be the one the URL was signed for.
pub async fn put_object(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    authorize(&state.store, Method::Put, &key, content_type, query)?;

    let size = state
        .store
        .put_object(&key, content_type, &body)
        .await
        .map_err(|e| storage_status(e, &key))?;
    info!(key = %key, size, "object uploaded");
    Ok(StatusCode::OK)
}

/// GET /objects/{*key}: download through a presigned URL.
pub async fn get_object(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<impl IntoResponse, StatusCode> {
    authorize(&state.store, Method::Get, &key, "", query)?;
    serve(&state.store, &key).await
}

/// GET /public/avatars/{user_id}: the public alias avatar URLs point at.
pub async fn public_avatar(
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    serve(&state.store, &avatar_key(user_id)).await
}

fn authorize(
    store: &LocalObjectStore,
    expected: Method,
    key: &str,
    content_type: &str,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<(), StatusCode> {
    let Query(query) = query.map_err(|_| StatusCode::FORBIDDEN)?;
    let method: Method = query.method.parse().map_err(|_| StatusCode::FORBIDDEN)?;
    if method != expected {
        return Err(StatusCode::FORBIDDEN);
    }

    store
        .presigner()
        .verify(method, key, query.expires, content_type, &query.signature, Utc::now())
        .map_err(|e| {
            debug!(key, method = %method, error = %e, "presigned request refused");
            StatusCode::FORBIDDEN
        })
}

/// Stream an object from disk with its stored content type.
async fn serve(store: &LocalObjectStore, key: &str) -> Result<impl IntoResponse + use<>, StatusCode> {
    let (file, head) = store.open_object(key).await.map_err(|e| storage_status(e, key))?;

    let content_type = head.content_type.as_deref().unwrap_or("application/octet-stream");
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(head.content_length));

    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))))
}

fn storage_status(err: StorageError, key: &str) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        other => {
            error!(key, error = %other, "object storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
