//! One-shot ingestion: process a single notification batch and exit.
//!
//! Usage: `vault-ingest [batch.json]` (reads stdin when no file is given).

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use vault_db::Database;
use vault_ingest::{IngestConfig, Ingestor};
use vault_storage::{LocalObjectStore, Presigner};
use vault_types::events::StorageEvent;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault=debug,vault_ingest=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let event: StorageEvent = serde_json::from_str(&raw).context("parsing notification batch")?;
    let records = event.object_created();

    let db = Arc::new(Database::open(&PathBuf::from(env_or("VAULT_DB_PATH", "vault.db")))?);

    // Presigning is never exercised here; the store just needs a signer.
    let secret = std::env::var("VAULT_PRESIGN_SECRET")
        .or_else(|_| std::env::var("VAULT_JWT_SECRET"))
        .unwrap_or_default();
    let store = LocalObjectStore::new(
        PathBuf::from(env_or("VAULT_STORAGE_DIR", "./object-storage")),
        env_or("VAULT_BUCKET", "vault-attachments"),
        Presigner::new(secret, env_or("VAULT_OBJECT_BASE_URL", "http://localhost:3000/objects")),
    )
    .await?;

    let record_timeout: u64 = env_or("VAULT_INGEST_RECORD_TIMEOUT_SECS", "30")
        .parse()
        .context("VAULT_INGEST_RECORD_TIMEOUT_SECS")?;
    let ingestor = Ingestor::new(
        db,
        Arc::new(store),
        IngestConfig {
            public_base_url: env_or("VAULT_PUBLIC_BASE_URL", "http://localhost:3000/public"),
            record_timeout: Duration::from_secs(record_timeout),
        },
    );

    let report = ingestor.process_batch(&records).await?;
    info!(?report, "ingest complete");
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
