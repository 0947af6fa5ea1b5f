use serde::{Deserialize, Serialize};

/// A batch of bucket notifications in the S3 event shape:
/// `{"Records": [{"eventName": "...", "s3": {"bucket": {"name": ...}, "object": {"key": ...}}}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded, exactly as the bucket delivers it.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One "object created" notification. The key is still URL-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
}

impl StorageEvent {
    /// Creation notifications in delivery order. Records without an event
    /// name are treated as creations; anything else (removals, test events)
    /// is dropped.
    pub fn object_created(&self) -> Vec<ObjectCreated> {
        self.records
            .iter()
            .filter(|r| r.event_name.is_empty() || r.event_name.contains("ObjectCreated"))
            .map(|r| ObjectCreated {
                bucket: r.s3.bucket.name.clone(),
                key: r.s3.object.key.clone(),
            })
            .collect()
    }
}
