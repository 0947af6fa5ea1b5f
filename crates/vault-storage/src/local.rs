use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use vault_types::events::ObjectCreated;
use vault_types::keys::encode_event_key;

use crate::{Method, ObjectHead, ObjectStore, Presigner, StorageError};

/// A single bucket on local disk.
///
/// Object bytes live at `{dir}/objects/{key}` and the content type at
/// `{dir}/meta/{key}`. Each successful put publishes an [`ObjectCreated`]
/// with the key URL-encoded, the same shape a hosted bucket delivers.
pub struct LocalObjectStore {
    dir: PathBuf,
    bucket: String,
    presigner: Presigner,
    events: Option<UnboundedSender<ObjectCreated>>,
}

impl LocalObjectStore {
    pub async fn new(dir: PathBuf, bucket: impl Into<String>, presigner: Presigner) -> Result<Self, StorageError> {
        fs::create_dir_all(dir.join("objects")).await?;
        fs::create_dir_all(dir.join("meta")).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            dir,
            bucket: bucket.into(),
            presigner,
            events: None,
        })
    }

    pub fn with_events(mut self, events: UnboundedSender<ObjectCreated>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn presigner(&self) -> &Presigner {
        &self.presigner
    }

    fn checked(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        if bucket != self.bucket {
            return Err(StorageError::NotFound(format!("{bucket}/{key}")));
        }
        Ok(())
    }

    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join("objects").join(validate_key(key)?))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join("meta").join(validate_key(key)?))
    }

    /// Store an object, replacing any previous version, then announce it.
    pub async fn put_object(&self, key: &str, content_type: &str, data: &[u8]) -> Result<u64, StorageError> {
        let path = self.object_path(key)?;
        let meta = self.meta_path(key)?;
        write_atomic(&path, data).await?;
        write_atomic(&meta, content_type.as_bytes()).await?;
        debug!(key, size = data.len(), content_type, "object stored");

        if let Some(events) = &self.events {
            let event = ObjectCreated {
                bucket: self.bucket.clone(),
                key: encode_event_key(key),
            };
            if events.send(event).is_err() {
                warn!(key, "ingest channel closed, object-created event dropped");
            }
        }
        Ok(data.len() as u64)
    }

    /// Open an object for streaming together with its metadata.
    pub async fn open_object(&self, key: &str) -> Result<(fs::File, ObjectHead), StorageError> {
        let head = self.head_object(&self.bucket, key).await?;
        let file = fs::File::open(self.object_path(key)?).await.map_err(|e| not_found(e, key))?;
        Ok((file, head))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError> {
        self.checked(bucket, key)?;
        let metadata = fs::metadata(self.object_path(key)?)
            .await
            .map_err(|e| not_found(e, key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let content_type = match fs::read_to_string(self.meta_path(key)?).await {
            Ok(ct) if !ct.is_empty() => Some(ct),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(ObjectHead {
            content_length: metadata.len(),
            content_type,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.checked(bucket, key)?;
        for path in [self.object_path(key)?, self.meta_path(key)?] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(key, "object deleted");
        Ok(())
    }

    fn presigned_put_url(&self, key: &str, content_type: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        self.presigner.url(Method::Put, key, content_type, ttl, Utc::now())
    }

    fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        self.presigner.url(Method::Get, key, "", ttl, Utc::now())
    }
}

/// Keys are relative, `/`-separated and may not climb out of the bucket.
fn validate_key(key: &str) -> Result<&Path, StorageError> {
    let invalid = || StorageError::InvalidKey(key.to_string());
    if key.is_empty() || key.contains('\\') || key.contains('\0') {
        return Err(invalid());
    }
    if key.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(invalid());
    }
    let path = Path::new(key);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid());
    }
    Ok(path)
}

fn not_found(e: std::io::Error, key: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temp file plus rename, so readers never see a half-written object.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".tmp-{}-{seq}", std::process::id()));
    let tmp = path.with_file_name(tmp_name);
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    Ok(())
}
