//! Inbound message pipeline
//!
//! Runs synchronously on the request path: rate limit, recipient bucketing,
//! delivery rows, then a non-blocking hand-off to the delivery queue.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::notify::{emit, NotificationEvent, Notifier};
use super::queue::DeliveryQueue;
use super::rate_limit::{RateLimitStatus, RateLimiter};
use super::repo::{MessageRepo, MessageRepoError};
use super::types::{Message, MessageStatus, NewMessage};
use crate::config::RateLimitConfig;
use crate::congress::{
    bucket_recipients, EmailRouting, Legislator, LegislatorRepo, LegislatorRepoError,
    RecipientBuckets,
};
use crate::constituents::{Address, ConstituentRepo, ConstituentRepoError};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("sender not found")]
    UnknownSender,
    #[error("sender has no address on file")]
    NoAddress,
    #[error("message has no recipients")]
    NoRecipients,
    #[error("message is {0}, only blocked messages can be re-sent")]
    NotBlocked(MessageStatus),
    #[error(transparent)]
    Messages(#[from] MessageRepoError),
    #[error(transparent)]
    Constituents(#[from] ConstituentRepoError),
    #[error(transparent)]
    Legislators(#[from] LegislatorRepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Handed to the delivery worker
    Queued,
    /// Held as blocked until an explicit re-send
    RateLimited,
    /// No contactable recipient; never queued
    Undeliverable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InboundOutcome {
    pub disposition: Disposition,
    /// Message status after processing
    pub status: MessageStatus,
    pub rate_limit: RateLimitStatus,
    pub buckets: RecipientBuckets,
}

pub struct InboundPipeline {
    messages: Arc<dyn MessageRepo>,
    constituents: Arc<dyn ConstituentRepo>,
    legislators: Arc<dyn LegislatorRepo>,
    rate_limiter: RateLimiter,
    routing: EmailRouting,
    queue: Arc<dyn DeliveryQueue>,
    notifier: Arc<dyn Notifier>,
}

impl InboundPipeline {
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepo>,
        constituents: Arc<dyn ConstituentRepo>,
        legislators: Arc<dyn LegislatorRepo>,
        queue: Arc<dyn DeliveryQueue>,
        notifier: Arc<dyn Notifier>,
        rate_limit: RateLimitConfig,
        routing: EmailRouting,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(Arc::clone(&messages), rate_limit),
            messages,
            constituents,
            legislators,
            routing,
            queue,
            notifier,
        }
    }

    /// Store an inbound message under the sender's current address.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::UnknownSender`] or [`IntakeError::NoAddress`]
    /// for senders that cannot send, [`IntakeError::NoRecipients`] for an
    /// empty recipient list.
    pub async fn create_message(
        &self,
        sender_id: Uuid,
        recipients: Vec<String>,
        subject: String,
        body: String,
        email_uid: Option<String>,
    ) -> Result<Message, IntakeError> {
        let recipients: Vec<String> = recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(IntakeError::NoRecipients);
        }

        let constituent = match self.constituents.get_constituent(sender_id).await {
            Ok(constituent) => constituent,
            Err(ConstituentRepoError::NotFound) => return Err(IntakeError::UnknownSender),
            Err(e) => return Err(e.into()),
        };
        let address = match self.constituents.current_address(constituent.id).await {
            Ok(address) => address,
            Err(ConstituentRepoError::NoAddress) => return Err(IntakeError::NoAddress),
            Err(e) => return Err(e.into()),
        };

        let message = self
            .messages
            .create_message(&NewMessage {
                constituent_id: constituent.id,
                address_id: address.id,
                to_originally: recipients,
                subject,
                body,
                email_uid: email_uid.unwrap_or_else(|| Uuid::new_v4().to_string()),
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            message_id = %message.id,
            constituent_id = %constituent.id,
            email_uid = %message.email_uid,
            "message created"
        );
        Ok(message)
    }

    /// Rate limit, bucket and, when allowed, queue a message.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError` on storage failures. Blocked and undeliverable
    /// messages are outcomes, not errors.
    pub async fn process_inbound(&self, message: &Message) -> Result<InboundOutcome, IntakeError> {
        let rate_limit = self
            .rate_limiter
            .status(message.constituent_id, Utc::now())
            .await?;
        let status = match rate_limit {
            RateLimitStatus::Free => MessageStatus::Free,
            RateLimitStatus::Block => MessageStatus::Blocked,
        };
        self.messages.set_status(message.id, status).await?;

        let address = self.constituents.get_address(message.address_id).await?;
        let permitted = self.permitted_legislators(&address).await?;
        let buckets = self.bucket(&permitted, &message.to_originally).await?;

        self.messages
            .create_deliveries(message.id, &buckets.contactable)
            .await?;

        let (disposition, status) = if !buckets.has_contactable() {
            tracing::info!(
                message_id = %message.id,
                non_existent = buckets.non_existent.len(),
                uncontactable = buckets.uncontactable.len(),
                does_not_represent = buckets.does_not_represent.len(),
                "message undeliverable"
            );
            emit(
                self.notifier.as_ref(),
                NotificationEvent::Undeliverable {
                    message_id: message.id,
                    constituent_id: message.constituent_id,
                    buckets: buckets.clone(),
                },
            )
            .await;
            (Disposition::Undeliverable, status)
        } else if rate_limit == RateLimitStatus::Block {
            emit(
                self.notifier.as_ref(),
                NotificationEvent::RateLimited {
                    message_id: message.id,
                    constituent_id: message.constituent_id,
                },
            )
            .await;
            (Disposition::RateLimited, MessageStatus::Blocked)
        } else {
            self.messages
                .set_status(message.id, MessageStatus::Queued)
                .await?;
            if let Err(e) = self.queue.enqueue(message.id) {
                // Still queued in storage; the recovery sweep will pick it up.
                tracing::warn!(message_id = %message.id, error = %e, "enqueue failed");
            }
            emit(
                self.notifier.as_ref(),
                NotificationEvent::Queued {
                    message_id: message.id,
                    constituent_id: message.constituent_id,
                    bioguide_ids: buckets
                        .contactable
                        .iter()
                        .map(|l| l.bioguide_id.clone())
                        .collect(),
                },
            )
            .await;
            (Disposition::Queued, MessageStatus::Queued)
        };

        Ok(InboundOutcome {
            disposition,
            status,
            rate_limit,
            buckets,
        })
    }

    /// Explicitly re-send a blocked message, re-evaluating the rate window.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::NotBlocked`] unless the message is blocked.
    pub async fn resend(&self, message_id: Uuid) -> Result<InboundOutcome, IntakeError> {
        let message = self.messages.get_message(message_id).await?;
        if message.status != MessageStatus::Blocked {
            return Err(IntakeError::NotBlocked(message.status));
        }
        self.process_inbound(&message).await
    }

    async fn permitted_legislators(
        &self,
        address: &Address,
    ) -> Result<Vec<Legislator>, IntakeError> {
        match &address.district {
            Some(district) => Ok(self.legislators.permitted_for(district).await?),
            None => {
                tracing::warn!(
                    constituent_id = %address.constituent_id,
                    address_id = %address.id,
                    "sender has no resolved district"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn bucket(
        &self,
        permitted: &[Legislator],
        addressed: &[String],
    ) -> Result<RecipientBuckets, IntakeError> {
        let lookups: Vec<String> = addressed
            .iter()
            .filter(|email| !self.routing.is_catch_all(email))
            .map(|email| self.routing.normalize(email))
            .collect();
        let known = if lookups.is_empty() {
            Vec::new()
        } else {
            self.legislators.find_by_emails(&lookups).await?
        };
        let directory = self.routing.directory(known);
        Ok(bucket_recipients(
            permitted,
            addressed,
            &self.routing,
            &directory,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congress::mock::MockLegislatorRepo;
    use crate::congress::{Chamber, District, ResolvedDistrict};
    use crate::constituents::mock::MockConstituentRepo;
    use crate::constituents::NewAddress;
    use crate::messages::mock::{MockMessageRepo, RecordingNotifier};
    use crate::messages::queue::ChannelDeliveryQueue;
    use crate::messages::DeliveryStatus;
    use chrono::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn member(bioguide: &str, state: &str, district: Option<i32>, contactable: bool) -> Legislator {
        Legislator {
            id: Uuid::new_v4(),
            bioguide_id: bioguide.into(),
            chamber: if district.is_some() {
                Chamber::House
            } else {
                Chamber::Senate
            },
            state: state.into(),
            district,
            title: "Rep".into(),
            first_name: bioguide.into(),
            last_name: "Example".into(),
            email: format!("{}@opencongress.org", bioguide.to_lowercase()),
            contactable,
        }
    }

    struct Harness {
        messages: Arc<MockMessageRepo>,
        constituents: Arc<MockConstituentRepo>,
        legislators: Arc<MockLegislatorRepo>,
        notifier: Arc<RecordingNotifier>,
        rx: UnboundedReceiver<Uuid>,
        pipeline: InboundPipeline,
    }

    fn harness() -> Harness {
        let messages = Arc::new(MockMessageRepo::new());
        let constituents = Arc::new(MockConstituentRepo::new());
        let legislators = Arc::new(MockLegislatorRepo::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (queue, rx) = ChannelDeliveryQueue::channel();
        let pipeline = InboundPipeline::new(
            messages.clone(),
            constituents.clone(),
            legislators.clone(),
            Arc::new(queue),
            notifier.clone(),
            RateLimitConfig {
                interval_hours: 24,
                max_per_interval: 5,
            },
            EmailRouting::new("myreps@emailcongress.us", "emailcongress.us", "opencongress.org"),
        );
        Harness {
            messages,
            constituents,
            legislators,
            notifier,
            rx,
            pipeline,
        }
    }

    async fn sender(h: &Harness, state: &str, district: Option<i32>) -> Uuid {
        let constituent = h
            .constituents
            .create_constituent(&format!("{}@example.com", Uuid::new_v4()))
            .await
            .unwrap();
        let address = h
            .constituents
            .add_address_generation(
                constituent.id,
                &NewAddress {
                    first_name: "Pat".into(),
                    last_name: "Doe".into(),
                    street_address: "1 Main St".into(),
                    city: "Washington".into(),
                    state: state.into(),
                    zip5: "20001".into(),
                    ..NewAddress::default()
                },
            )
            .await
            .unwrap();
        h.constituents
            .record_district(
                address.id,
                &ResolvedDistrict {
                    district: District::new(state, district),
                    state: state.into(),
                    coordinates: None,
                },
            )
            .await
            .unwrap();
        constituent.id
    }

    async fn send(h: &Harness, sender_id: Uuid, to: &[&str]) -> (Message, InboundOutcome) {
        let message = h
            .pipeline
            .create_message(
                sender_id,
                to.iter().map(ToString::to_string).collect(),
                "Subject".into(),
                "Body".into(),
                None,
            )
            .await
            .unwrap();
        let outcome = h.pipeline.process_inbound(&message).await.unwrap();
        (message, outcome)
    }

    #[tokio::test]
    async fn dc_catch_all_queues_one_unsent_delivery_per_dc_legislator() {
        let mut h = harness();
        let delegate = member("N000147", "DC", None, true);
        let shadow = member("S000001", "DC", None, true);
        h.legislators.insert(delegate.clone());
        h.legislators.insert(shadow.clone());
        h.legislators.insert(member("V000128", "VA", Some(8), true));
        let sender_id = sender(&h, "DC", None).await;

        let (message, outcome) = send(&h, sender_id, &["myreps@emailcongress.us"]).await;

        assert_eq!(outcome.disposition, Disposition::Queued);
        assert_eq!(outcome.rate_limit, RateLimitStatus::Free);
        let deliveries = h.messages.list_deliveries(message.id).await.unwrap();
        let mut ids: Vec<&str> = deliveries.iter().map(|d| d.bioguide_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["N000147", "S000001"]);
        assert!(deliveries.iter().all(|d| d.status == DeliveryStatus::Unsent));
        assert_eq!(
            h.messages.get_message(message.id).await.unwrap().status,
            MessageStatus::Queued
        );
        assert_eq!(h.rx.recv().await, Some(message.id));
        assert_eq!(h.notifier.kinds(), vec!["queued"]);
    }

    #[tokio::test]
    async fn sixth_message_in_window_is_blocked_not_queued() {
        let mut h = harness();
        h.legislators.insert(member("V000128", "VA", Some(8), true));
        let sender_id = sender(&h, "VA", Some(8)).await;
        let address_id = h
            .constituents
            .current_address(sender_id)
            .await
            .unwrap()
            .id;
        for i in 0..5 {
            h.messages.insert_message(Message {
                id: Uuid::new_v4(),
                constituent_id: sender_id,
                address_id,
                to_originally: vec![],
                subject: String::new(),
                body: String::new(),
                email_uid: format!("old-{i}"),
                status: MessageStatus::Finalized,
                delivery_attempts: 1,
                created_at: Utc::now() - Duration::hours(1),
            });
        }

        let (message, outcome) = send(&h, sender_id, &["v000128@emailcongress.us"]).await;

        assert_eq!(outcome.disposition, Disposition::RateLimited);
        assert_eq!(
            h.messages.get_message(message.id).await.unwrap().status,
            MessageStatus::Blocked
        );
        assert!(h.rx.try_recv().is_err());
        assert_eq!(h.notifier.kinds(), vec!["rate_limited"]);

        // An explicit re-send inside the window stays blocked.
        let again = h.pipeline.resend(message.id).await.unwrap();
        assert_eq!(again.disposition, Disposition::RateLimited);
        assert_eq!(h.messages.list_deliveries(message.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_recipients_are_never_queued() {
        let h = harness();
        h.legislators.insert(member("V000128", "VA", Some(8), true));
        h.legislators.insert(member("Q000001", "VA", Some(2), false));
        let sender_id = sender(&h, "VA", Some(8)).await;

        let (message, outcome) = send(
            &h,
            sender_id,
            &["nobody@emailcongress.us", "q000001@emailcongress.us"],
        )
        .await;

        assert_eq!(outcome.disposition, Disposition::Undeliverable);
        assert_eq!(outcome.buckets.non_existent, vec!["nobody@emailcongress.us"]);
        assert_eq!(outcome.buckets.uncontactable.len(), 1);
        assert_eq!(
            h.messages.get_message(message.id).await.unwrap().status,
            MessageStatus::Free
        );
        assert!(h.messages.list_deliveries(message.id).await.unwrap().is_empty());
        assert_eq!(h.notifier.kinds(), vec!["undeliverable"]);
    }

    #[tokio::test]
    async fn sender_without_district_has_no_permitted_legislators() {
        let h = harness();
        h.legislators.insert(member("V000128", "VA", Some(8), true));
        let constituent = h
            .constituents
            .create_constituent("nodistrict@example.com")
            .await
            .unwrap();
        h.constituents
            .add_address_generation(
                constituent.id,
                &NewAddress {
                    first_name: "Pat".into(),
                    last_name: "Doe".into(),
                    street_address: "1 Main St".into(),
                    city: "Arlington".into(),
                    state: "VA".into(),
                    zip5: "22201".into(),
                    ..NewAddress::default()
                },
            )
            .await
            .unwrap();

        let (_, outcome) = send(&h, constituent.id, &["v000128@emailcongress.us"]).await;

        assert_eq!(outcome.disposition, Disposition::Undeliverable);
        assert_eq!(outcome.buckets.does_not_represent.len(), 1);
    }

    #[tokio::test]
    async fn resend_rejects_messages_that_are_not_blocked() {
        let h = harness();
        h.legislators.insert(member("V000128", "VA", Some(8), true));
        let sender_id = sender(&h, "VA", Some(8)).await;
        let (message, _) = send(&h, sender_id, &["v000128@emailcongress.us"]).await;

        let err = h.pipeline.resend(message.id).await.unwrap_err();
        assert!(matches!(err, IntakeError::NotBlocked(MessageStatus::Queued)));
    }

    #[tokio::test]
    async fn create_message_validates_sender_and_recipients() {
        let h = harness();
        let err = h
            .pipeline
            .create_message(Uuid::new_v4(), vec!["a@b.c".into()], "s".into(), "b".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnknownSender));

        let sender_id = sender(&h, "VA", Some(8)).await;
        let err = h
            .pipeline
            .create_message(sender_id, vec!["  ".into()], "s".into(), "b".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::NoRecipients));
    }
}
