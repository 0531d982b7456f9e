//! Messages, from intake to final delivery report.
//!
//! - [`InboundPipeline`] - rate limit, bucketing and queueing on the request path
//! - [`RateLimiter`] - sliding-window send limit
//! - [`DeliveryOrchestrator`] - retrying whole-message delivery attempts
//! - [`DeliveryWorker`] - consumes the [`DeliveryQueue`]
//! - [`Notifier`] - outbound events for the sender

mod delivery;
mod intake;
mod notify;
mod queue;
mod rate_limit;
mod repo;
mod types;

pub use delivery::{AttemptOutcome, DeliveryError, DeliveryOrchestrator, DeliveryReport};
pub use intake::{Disposition, InboundOutcome, InboundPipeline, IntakeError};
pub use notify::{
    notifier_from_config, LogNotifier, NotificationEvent, Notifier, NotifyError, WebhookNotifier,
};
pub use queue::{ChannelDeliveryQueue, DeliveryQueue, DeliveryWorker, QueueError};
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use repo::{
    begin_attempt, count_messages_since, create_deliveries, create_message, end_attempt,
    finalize_message, get_message, list_deliveries, list_queued, record_delivery_result,
    requeue_with_conn, set_message_status, MessageRepo, MessageRepoError, PgMessageRepo,
};
pub use types::{Delivery, DeliveryStatus, Message, MessageStatus, NewMessage};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    pub use super::notify::mock::RecordingNotifier;
    pub use super::repo::mock::MockMessageRepo;
}
