use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use tracing::warn;

use vault_api::error::ApiError;
use vault_ingest::{BatchReport, IngestError};
use vault_types::events::StorageEvent;

use crate::ServerState;

pub const INGEST_TOKEN_HEADER: &str = "x-vault-ingest-token";

/// POST /events: bucket notification webhook.
///
/// Runs the batch inline and answers with its report. A malformed key is
/// the one fatal case and comes back as 400 so the sender redelivers the
/// unprocessed tail.
pub async fn ingest_events(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(event): Json<StorageEvent>,
) -> Result<Json<BatchReport>, ApiError> {
    if let Some(expected) = &state.ingest_token {
        let presented = headers.get(INGEST_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!("event webhook called without a valid ingest token");
            return Err(ApiError::Unauthorized("invalid ingest token".into()));
        }
    }

    let records = event.object_created();
    match state.ingestor.process_batch(&records).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ IngestError::MalformedKey { .. }) => Err(ApiError::validation(e.to_string())),
    }
}
