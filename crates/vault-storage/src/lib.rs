//! Object storage as the rest of the service sees it: a small collaborator
//! trait plus a disk-backed implementation that behaves like a bucket.

pub mod error;
pub mod local;
pub mod presign;

use std::time::Duration;

use async_trait::async_trait;

pub use error::StorageError;
pub use local::LocalObjectStore;
pub use presign::{Method, Presigner};

/// Lifetime of every presigned URL handed to clients.
pub const PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Object metadata returned by [`ObjectStore::head_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// URL a client can PUT the object to, with `content_type` bound into
    /// the signature.
    fn presigned_put_url(&self, key: &str, content_type: &str, ttl: Duration) -> Result<String, StorageError>;

    fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}
