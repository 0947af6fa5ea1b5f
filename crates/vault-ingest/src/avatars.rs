use std::sync::Arc;

use uuid::Uuid;

use vault_db::{Database, StoreError};

pub struct AvatarRegistrar {
    db: Arc<Database>,
    public_base_url: String,
}

/// Public URL of an object served through the bucket's public alias.
pub fn public_url(public_base_url: &str, key: &str) -> String {
    format!("{}/{}", public_base_url.trim_end_matches('/'), key)
}

impl AvatarRegistrar {
    pub fn new(db: Arc<Database>, public_base_url: impl Into<String>) -> Self {
        Self {
            db,
            public_base_url: public_base_url.into(),
        }
    }

    /// Point the user's avatar at the uploaded object, returning the URL and
    /// the number of rows touched (zero when the user does not exist).
    pub async fn register(&self, user_id: Uuid, key: &str) -> Result<(String, usize), StoreError> {
        let db = self.db.clone();
        let url = public_url(&self.public_base_url, key);
        let stored = url.clone();

        let rows = tokio::task::spawn_blocking(move || db.set_avatar_url(user_id, &stored))
            .await
            .map_err(|e| StoreError::Internal(format!("avatar task failed: {e}")))??;
        Ok((url, rows))
    }
}
