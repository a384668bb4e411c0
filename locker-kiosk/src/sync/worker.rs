//! SyncWorker — background worker that keeps the mirror trailing the backend
//!
//! Subscribes to the change feed, debounces events, and applies batches to
//! the mirror store incrementally, with a periodic full resync as safety net.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::sync::{ChangeEvent, SyncBridge};

/// Debounce window for batching changes
const DEBOUNCE_MS: u64 = 500;
/// Max retry attempts per batch item
const MAX_RETRIES: u32 = 3;
/// Initial retry delay
const INITIAL_RETRY_DELAY_SECS: u64 = 5;

pub struct SyncWorker {
    bridge: Arc<SyncBridge>,
    feed_rx: broadcast::Receiver<ChangeEvent>,
    full_sync_interval_secs: u64,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(
        bridge: Arc<SyncBridge>,
        feed_rx: broadcast::Receiver<ChangeEvent>,
        full_sync_interval_secs: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            feed_rx,
            full_sync_interval_secs,
            shutdown,
        }
    }

    /// Run the sync worker
    ///
    /// 1. Full resync on startup
    /// 2. Listen for change events, debounce and apply
    /// 3. Periodic full resync
    pub async fn run(mut self) {
        tracing::info!("SyncWorker started");

        if let Err(e) = self.bridge.full_resync().await {
            tracing::error!("Initial full resync failed: {e}");
        }

        let mut full_sync_interval =
            tokio::time::interval(Duration::from_secs(self.full_sync_interval_secs));
        full_sync_interval.tick().await; // skip immediate tick

        // Debounce buffer: (collection, id) -> latest event. Later events for
        // the same record supersede earlier ones within the window.
        let mut pending: HashMap<(crate::store::Collection, String), ChangeEvent> = HashMap::new();
        let mut debounce_deadline: Option<Instant> = None;

        loop {
            let sleep_until =
                debounce_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("SyncWorker shutting down");
                    if !pending.is_empty() {
                        self.flush_pending(&mut pending).await;
                    }
                    break;
                }

                _ = tokio::time::sleep_until(sleep_until), if debounce_deadline.is_some() => {
                    self.flush_pending(&mut pending).await;
                    debounce_deadline = None;
                }

                _ = full_sync_interval.tick() => {
                    if let Err(e) = self.bridge.full_resync().await {
                        tracing::error!("Periodic full resync failed: {e}");
                    }
                }

                result = self.feed_rx.recv() => {
                    match result {
                        Ok(event) => {
                            pending.insert((event.collection, event.id.clone()), event);
                            debounce_deadline = Some(Instant::now() + Duration::from_millis(DEBOUNCE_MS));
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("SyncWorker lagged {n} events, scheduling full resync");
                            debounce_deadline = None;
                            pending.clear();
                            if let Err(e) = self.bridge.full_resync().await {
                                tracing::error!("Recovery full resync failed: {e}");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Change feed closed, SyncWorker stopping");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("SyncWorker stopped");
    }

    /// Apply all buffered events, retrying each with backoff.
    async fn flush_pending(
        &self,
        pending: &mut HashMap<(crate::store::Collection, String), ChangeEvent>,
    ) {
        let events: Vec<ChangeEvent> = pending.drain().map(|(_, event)| event).collect();
        if events.is_empty() {
            return;
        }

        let count = events.len();
        for event in events {
            if let Err(e) = self.apply_with_retry(&event).await {
                tracing::error!(
                    collection = %event.collection,
                    id = %event.id,
                    "Mirror update failed after retries: {e}"
                );
            }
        }
        tracing::debug!("Flushed {count} mirror updates");
    }

    /// Apply one event with exponential backoff retry
    async fn apply_with_retry(&self, event: &ChangeEvent) -> shared::AppResult<()> {
        let mut delay = Duration::from_secs(INITIAL_RETRY_DELAY_SECS);

        for attempt in 0..MAX_RETRIES {
            match self.bridge.apply(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 < MAX_RETRIES => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        delay_secs = delay.as_secs(),
                        "Mirror update attempt failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(60));
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!()
    }
}
