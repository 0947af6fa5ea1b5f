use std::sync::Arc;

use uuid::Uuid;

use vault_db::attachments::{NewAttachment, Registration};
use vault_db::{Database, StoreError};
use vault_storage::ObjectHead;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub struct AttachmentRegistrar {
    db: Arc<Database>,
}

impl AttachmentRegistrar {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record an accepted upload against its note. The object key doubles as
    /// the idempotency key, so a redelivered event comes back as
    /// [`Registration::Duplicate`].
    pub async fn register(
        &self,
        note_id: Uuid,
        filename: String,
        object_key: String,
        head: ObjectHead,
    ) -> Result<Registration, StoreError> {
        let db = self.db.clone();
        let size = i64::try_from(head.content_length)
            .map_err(|_| StoreError::validation("object size out of range"))?;
        let mime_type = head
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        tokio::task::spawn_blocking(move || {
            db.register_attachment(NewAttachment {
                note_id,
                object_key: &object_key,
                file_name: &filename,
                mime_type: &mime_type,
                size,
            })
        })
        .await
        .map_err(|e| StoreError::Internal(format!("registration task failed: {e}")))?
    }
}
