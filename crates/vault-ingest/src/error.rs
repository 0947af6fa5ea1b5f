use thiserror::Error;

use vault_types::keys::KeyDecodeError;

/// Conditions that abort a whole batch. Everything else is per record.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed object key {key:?}: {source}")]
    MalformedKey {
        key: String,
        #[source]
        source: KeyDecodeError,
    },
}
