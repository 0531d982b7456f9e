//! Notification events for the sender.
//!
//! Rendering and sending the actual emails happens elsewhere; this module
//! only hands events to a [`Notifier`]. Notification failures never affect
//! delivery state.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::delivery::DeliveryReport;
use crate::config::NotificationsConfig;
use crate::congress::RecipientBuckets;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// The message was accepted and handed to the delivery worker.
    Queued {
        message_id: Uuid,
        constituent_id: Uuid,
        bioguide_ids: Vec<String>,
    },
    /// The sender is over the rate limit; the message stays blocked.
    RateLimited {
        message_id: Uuid,
        constituent_id: Uuid,
    },
    /// No addressed recipient can receive the message.
    Undeliverable {
        message_id: Uuid,
        constituent_id: Uuid,
        buckets: RecipientBuckets,
    },
    /// Final per-legislator outcome after the last attempt.
    SendStatus {
        constituent_id: Uuid,
        report: DeliveryReport,
    },
}

impl NotificationEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::RateLimited { .. } => "rate_limited",
            Self::Undeliverable { .. } => "undeliverable",
            Self::SendStatus { .. } => "send_status",
        }
    }

    #[must_use]
    pub const fn message_id(&self) -> Uuid {
        match self {
            Self::Queued { message_id, .. }
            | Self::RateLimited { message_id, .. }
            | Self::Undeliverable { message_id, .. } => *message_id,
            Self::SendStatus { report, .. } => report.message_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match event {
            NotificationEvent::SendStatus { report, .. } => tracing::info!(
                message_id = %report.message_id,
                sent = report.sent_count(),
                failed = report.failed_count(),
                attempts = report.attempts,
                "notification: send status"
            ),
            other => tracing::info!(
                message_id = %other.message_id(),
                kind = other.kind(),
                "notification"
            ),
        }
        Ok(())
    }
}

/// POSTs each event as JSON to a configured URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// The webhook notifier when a URL is configured, otherwise the log.
///
/// # Errors
/// Returns an error if the webhook client cannot be built.
pub fn notifier_from_config(
    config: &NotificationsConfig,
) -> Result<std::sync::Arc<dyn Notifier>, NotifyError> {
    match &config.webhook_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.webhook_timeout_secs.unwrap_or(10));
            Ok(std::sync::Arc::new(WebhookNotifier::new(url.clone(), timeout)?))
        }
        None => Ok(std::sync::Arc::new(LogNotifier)),
    }
}

/// Send an event, logging instead of failing.
pub(crate) async fn emit(notifier: &dyn Notifier, event: NotificationEvent) {
    if let Err(e) = notifier.notify(&event).await {
        tracing::warn!(
            message_id = %event.message_id(),
            kind = event.kind(),
            error = %e,
            "failed to deliver notification"
        );
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::must_use_candidate)]
pub mod mock {
    //! Notifier that records every event.

    use super::{async_trait, NotificationEvent, Notifier, NotifyError};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingNotifier {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(NotificationEvent::kind).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let server = MockServer::start().await;
        let message_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/hooks/ec"))
            .and(body_partial_json(json!({
                "event": "rate_limited",
                "message_id": message_id,
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/hooks/ec", server.uri()), Duration::from_secs(2))
                .unwrap();
        notifier
            .notify(&NotificationEvent::RateLimited {
                message_id,
                constituent_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = notifier
            .notify(&NotificationEvent::RateLimited {
                message_id: Uuid::new_v4(),
                constituent_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Status(503)));
    }
}
