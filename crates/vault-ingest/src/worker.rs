use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use vault_types::events::ObjectCreated;

use crate::Ingestor;

/// Drain object-created notifications in batches of up to `batch_size`
/// until every sender is gone.
pub async fn run_event_loop(mut rx: UnboundedReceiver<ObjectCreated>, ingestor: Arc<Ingestor>, batch_size: usize) {
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        batch.clear();
        if rx.recv_many(&mut batch, batch_size).await == 0 {
            info!("Ingest channel closed, worker stopping");
            return;
        }

        if let Err(e) = ingestor.process_batch(&batch).await {
            error!("Ingest batch aborted: {}", e);
        }
    }
}
