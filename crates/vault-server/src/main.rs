use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use vault_api::auth::{AppState, AppStateInner};
use vault_db::Database;
use vault_ingest::{IngestConfig, Ingestor, run_event_loop};
use vault_server::config::Config;
use vault_server::{ServerState, router};
use vault_storage::{LocalObjectStore, Presigner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault=debug,vault_ingest=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);

    // Uploads landing in the local bucket are announced on this channel and
    // drained by the ingest worker.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let store = Arc::new(
        LocalObjectStore::new(
            config.storage_dir.clone(),
            &config.bucket,
            Presigner::new(config.presign_secret.clone(), &config.object_base_url),
        )
        .await?
        .with_events(events_tx),
    );

    let ingestor = Arc::new(Ingestor::new(
        db.clone(),
        store.clone(),
        IngestConfig {
            public_base_url: config.public_base_url.clone(),
            record_timeout: config.record_timeout,
        },
    ));
    tokio::spawn(run_event_loop(events_rx, ingestor.clone(), config.batch_size));

    let api: AppState = Arc::new(AppStateInner {
        db,
        store: store.clone(),
        bucket: config.bucket.clone(),
        jwt_secret: config.jwt_secret.clone(),
        access_token_ttl: config.access_token_ttl,
        refresh_token_ttl: config.refresh_token_ttl,
    });
    let server = ServerState {
        store,
        ingestor,
        ingest_token: config.ingest_token.clone(),
    };
    if server.ingest_token.is_none() {
        warn!("VAULT_INGEST_TOKEN is unset, POST /events accepts unauthenticated batches");
    }

    let app = router(api, server);

    let addr = config.addr()?;
    info!("Vault server listening on {}", addr);
    info!("Bucket {} at {}", config.bucket, config.storage_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
