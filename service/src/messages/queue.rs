//! Delivery queue and worker.
//!
//! Intake only hands a message id to a [`DeliveryQueue`] and returns. The
//! durable state is the `messages` table: anything still `queued` is picked
//! up again on startup and by the periodic recovery sweep, so the channel
//! itself may lose ids without losing messages.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::delivery::DeliveryOrchestrator;
use super::repo::{MessageRepo, MessageRepoError};
use crate::config::DeliveryConfig;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("delivery queue is closed")]
    Closed,
}

/// Hand-off point between intake and delivery. Must not block.
pub trait DeliveryQueue: Send + Sync {
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if no worker is listening.
    fn enqueue(&self, message_id: Uuid) -> Result<(), QueueError>;
}

/// In-process queue backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct ChannelDeliveryQueue {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl ChannelDeliveryQueue {
    /// The queue plus the receiving end for [`DeliveryWorker::run`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliveryQueue for ChannelDeliveryQueue {
    fn enqueue(&self, message_id: Uuid) -> Result<(), QueueError> {
        self.tx.send(message_id).map_err(|_| QueueError::Closed)
    }
}

/// Runs the orchestrator for queued messages, one task per message.
pub struct DeliveryWorker {
    orchestrator: Arc<DeliveryOrchestrator>,
    messages: Arc<dyn MessageRepo>,
    config: DeliveryConfig,
    in_flight: Mutex<HashSet<Uuid>>,
    permits: Arc<Semaphore>,
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(
        orchestrator: Arc<DeliveryOrchestrator>,
        messages: Arc<dyn MessageRepo>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            orchestrator,
            messages,
            config,
            in_flight: Mutex::new(HashSet::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
        }
    }

    /// Re-enqueue every queued message whose lease is free.
    ///
    /// # Errors
    ///
    /// Returns `MessageRepoError` if the queued messages cannot be listed.
    pub async fn recover(&self, queue: &dyn DeliveryQueue) -> Result<usize, MessageRepoError> {
        let queued = self.messages.list_queued(Utc::now()).await?;
        let mut enqueued = 0;
        for message_id in queued {
            if queue.enqueue(message_id).is_ok() {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            tracing::info!(count = enqueued, "re-enqueued queued messages");
        }
        Ok(enqueued)
    }

    /// Consume the queue until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Uuid>) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            submit_messages = self.config.submit_messages,
            "delivery worker started"
        );
        while let Some(message_id) = rx.recv().await {
            self.dispatch(message_id).await;
        }
        tracing::info!("delivery queue closed, worker stopping");
    }

    /// Periodically call [`DeliveryWorker::recover`].
    pub async fn sweep(self: Arc<Self>, queue: Arc<dyn DeliveryQueue>) {
        let mut interval = tokio::time::interval(self.config.recovery_interval());
        loop {
            interval.tick().await;
            if let Err(e) = self.recover(queue.as_ref()).await {
                tracing::warn!(error = %e, "recovery sweep failed");
            }
        }
    }

    /// Start delivering one message unless it is already running here.
    ///
    /// Returns the spawned task, or `None` when the id was skipped.
    pub async fn dispatch(self: &Arc<Self>, message_id: Uuid) -> Option<JoinHandle<()>> {
        if !self.config.submit_messages {
            tracing::info!(%message_id, "message submission disabled, leaving message queued");
            return None;
        }

        if !self.in_flight.lock().await.insert(message_id) {
            tracing::debug!(%message_id, "delivery already in flight");
            return None;
        }

        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            match Arc::clone(&this.permits).acquire_owned().await {
                Ok(_permit) => match this.orchestrator.run(message_id).await {
                    Ok(Some(report)) => tracing::debug!(
                        %message_id,
                        sent = report.sent_count(),
                        failed = report.failed_count(),
                        "delivery finished"
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!(%message_id, error = %e, "delivery aborted"),
                },
                Err(e) => tracing::error!(%message_id, error = %e, "delivery worker shut down"),
            }
            this.in_flight.lock().await.remove(&message_id);
        }))
    }
}
