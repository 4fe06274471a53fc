use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::model::{NotificationError, NotificationEvent};

/// Longest a sink may take for one event before it counts as failed.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Downstream delivery (mail, websocket fan-out, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Writes every event to the log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(
            op = "LogNotificationSink::notify",
            asset_id = event.asset_id,
            kind = ?event.kind,
            title = %event.title,
            "{}",
            event.message
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Decouples pipeline completion from delivery. Events go through a bounded
/// buffer to a single background task; `dispatch` never waits on the sink.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Sender<NotificationEvent>,
    counters: Arc<Counters>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NotificationDispatcher {
    pub fn start(sink: Arc<dyn NotificationSink>, buffer: usize) -> Self {
        Self::start_with_timeout(sink, buffer, DELIVERY_TIMEOUT)
    }

    pub fn start_with_timeout(sink: Arc<dyn NotificationSink>, buffer: usize, timeout: Duration) -> Self {
        let (tx, rx) = async_channel::bounded(buffer.max(1));
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(deliver(rx, sink, counters.clone(), timeout));

        Self {
            tx,
            counters,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queues `event` for delivery. A full or closed buffer drops it.
    pub fn dispatch(&self, event: NotificationEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, event) = match e {
                TrySendError::Full(event) => ("buffer full", event),
                TrySendError::Closed(event) => ("dispatcher closed", event),
            };
            warn!(op = "NotificationDispatcher::dispatch", asset_id = event.asset_id, reason, "notification dropped");
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting events and waits until the buffered ones are delivered.
    pub async fn shutdown(&self) {
        self.tx.close();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(op = "NotificationDispatcher::shutdown", error = %e, "delivery task ended abnormally");
            }
        }
    }
}

async fn deliver(
    rx: Receiver<NotificationEvent>,
    sink: Arc<dyn NotificationSink>,
    counters: Arc<Counters>,
    timeout: Duration,
) {
    while let Ok(event) = rx.recv().await {
        let outcome = tokio::time::timeout(timeout, sink.notify(&event))
            .await
            .unwrap_or_else(|_| Err(NotificationError::Delivery(format!("no answer within {timeout:?}"))));
        match outcome {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(op = "NotificationDispatcher::deliver", asset_id = event.asset_id, error = %e, "notification delivery failed");
            }
        }
    }
}
