use tracing::{error, warn};

use vault_storage::{ObjectHead, ObjectStore};

/// Largest accepted upload. An object of exactly this size is accepted.
pub const MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(ObjectHead),
    /// Over the limit. The object has been deleted, or at least attempted.
    Oversized { size: u64 },
    /// Metadata could not be read; the object may already be gone.
    Unreadable,
}

pub async fn check(store: &dyn ObjectStore, bucket: &str, key: &str) -> Verdict {
    let head = match store.head_object(bucket, key).await {
        Ok(head) => head,
        Err(e) => {
            warn!(bucket, key, error = %e, "skip: cannot read object metadata");
            return Verdict::Unreadable;
        }
    };

    if head.content_length > MAX_UPLOAD_SIZE {
        warn!(
            bucket,
            key,
            size = head.content_length,
            limit = MAX_UPLOAD_SIZE,
            "object exceeds upload limit, deleting"
        );
        if let Err(e) = store.delete_object(bucket, key).await {
            error!(bucket, key, error = %e, "failed to delete oversized object");
        }
        return Verdict::Oversized {
            size: head.content_length,
        };
    }

    Verdict::Accepted(head)
}
