use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use vault_db::Database;
use vault_db::attachments::Registration;
use vault_storage::ObjectStore;
use vault_types::events::ObjectCreated;
use vault_types::keys::{UploadIntent, classify, decode_event_key};

use crate::attachments::AttachmentRegistrar;
use crate::avatars::AvatarRegistrar;
use crate::error::IngestError;
use crate::size_guard::{self, Verdict};

pub const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Base of the public alias avatars are served from.
    pub public_base_url: String,
    /// Deadline for one record: metadata fetch, optional delete and the
    /// registrar call together.
    pub record_timeout: Duration,
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    AttachmentCreated,
    Duplicate,
    AvatarUpdated,
    Skipped,
    RejectedOversize,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attachments_created: usize,
    pub duplicates: usize,
    pub avatars_updated: usize,
    pub skipped: usize,
    pub rejected_oversize: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: RecordOutcome) {
        let slot = match outcome {
            RecordOutcome::AttachmentCreated => &mut self.attachments_created,
            RecordOutcome::Duplicate => &mut self.duplicates,
            RecordOutcome::AvatarUpdated => &mut self.avatars_updated,
            RecordOutcome::Skipped => &mut self.skipped,
            RecordOutcome::RejectedOversize => &mut self.rejected_oversize,
            RecordOutcome::Failed => &mut self.failed,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.attachments_created
            + self.duplicates
            + self.avatars_updated
            + self.skipped
            + self.rejected_oversize
            + self.failed
    }
}

/// Routes storage notifications to the size guard and the registrars.
pub struct Ingestor {
    store: Arc<dyn ObjectStore>,
    attachments: AttachmentRegistrar,
    avatars: AvatarRegistrar,
    record_timeout: Duration,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, store: Arc<dyn ObjectStore>, config: IngestConfig) -> Self {
        Self {
            store,
            attachments: AttachmentRegistrar::new(db.clone()),
            avatars: AvatarRegistrar::new(db, config.public_base_url),
            record_timeout: config.record_timeout,
        }
    }

    /// Process records one after another in delivery order.
    ///
    /// A key that cannot be decoded stops the batch with
    /// [`IngestError::MalformedKey`]; records before it have already been
    /// applied and records after it are left for redelivery.
    pub async fn process_batch(&self, records: &[ObjectCreated]) -> Result<BatchReport, IngestError> {
        let mut report = BatchReport::default();

        for record in records {
            let key = decode_event_key(&record.key).map_err(|source| {
                error!(bucket = %record.bucket, key = %record.key, error = %source, "malformed key, aborting batch");
                IngestError::MalformedKey {
                    key: record.key.clone(),
                    source,
                }
            })?;

            let outcome = match tokio::time::timeout(self.record_timeout, self.process_record(&record.bucket, key.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(bucket = %record.bucket, key = %key, timeout = ?self.record_timeout, "record timed out");
                    RecordOutcome::Failed
                }
            };
            report.record(outcome);
        }

        info!(
            records = records.len(),
            created = report.attachments_created,
            duplicates = report.duplicates,
            avatars = report.avatars_updated,
            skipped = report.skipped,
            oversize = report.rejected_oversize,
            failed = report.failed,
            "batch processed"
        );
        Ok(report)
    }

    async fn process_record(&self, bucket: &str, key: String) -> RecordOutcome {
        let intent = classify(&key);

        // Keys without a `/` are never ours to police.
        if !key.contains('/') {
            warn!(bucket, key = %key, "skip: key has a single segment");
            return RecordOutcome::Skipped;
        }

        // The size limit holds whatever the key shape, so it runs before
        // unrecognized keys are dropped.
        let head = match size_guard::check(self.store.as_ref(), bucket, &key).await {
            Verdict::Accepted(head) => head,
            Verdict::Oversized { .. } => return RecordOutcome::RejectedOversize,
            Verdict::Unreadable => return RecordOutcome::Skipped,
        };

        if let UploadIntent::Unrecognized(reason) = &intent {
            warn!(bucket, key = %key, %reason, "skip: unrecognized key");
            return RecordOutcome::Skipped;
        }

        match intent {
            UploadIntent::Attachment { note_id, filename } => {
                match self.attachments.register(note_id, filename, key.clone(), head).await {
                    Ok(Registration::Created(row)) => {
                        info!(key = %key, note_id = %note_id, attachment_id = %row.id, size = row.size, "attachment created");
                        RecordOutcome::AttachmentCreated
                    }
                    Ok(Registration::Duplicate(row)) => {
                        info!(key = %key, attachment_id = %row.id, "attachment already registered, ignoring redelivery");
                        RecordOutcome::Duplicate
                    }
                    Err(e) => {
                        error!(key = %key, note_id = %note_id, error = %e, "failed to create attachment");
                        RecordOutcome::Failed
                    }
                }
            }
            UploadIntent::Avatar { user_id } => match self.avatars.register(user_id, &key).await {
                Ok((url, 0)) => {
                    error!(key = %key, user_id = %user_id, url = %url, "avatar update affected no rows");
                    RecordOutcome::Failed
                }
                Ok((url, _)) => {
                    info!(user_id = %user_id, url = %url, "avatar updated");
                    RecordOutcome::AvatarUpdated
                }
                Err(e) => {
                    error!(key = %key, user_id = %user_id, error = %e, "failed to update avatar");
                    RecordOutcome::Failed
                }
            },
            UploadIntent::Unrecognized(_) => RecordOutcome::Skipped,
        }
    }
}
