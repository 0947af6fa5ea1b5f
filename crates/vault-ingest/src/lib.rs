//! The attachment ingestion pipeline.
//!
//! Storage notifications arrive in batches; each record is decoded,
//! classified by key, size-checked and then registered against the note or
//! user its key names. Only an undecodable key aborts a batch.

pub mod attachments;
pub mod avatars;
pub mod dispatcher;
pub mod error;
pub mod size_guard;
pub mod worker;

pub use dispatcher::{BatchReport, IngestConfig, Ingestor, RecordOutcome};
pub use error::IngestError;
pub use size_guard::MAX_UPLOAD_SIZE;
pub use worker::run_event_loop;
