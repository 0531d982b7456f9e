//! Delivery orchestrator
//!
//! Drives one message through the form-filling service. Every attempt
//! covers the whole message: it claims the message through the repository
//! lease, submits every delivery that is not yet sent, and records each
//! outcome. The orchestrator retries whole attempts until everything is
//! sent or the attempt budget runs out, then finalizes the message once and
//! reports.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::notify::{emit, NotificationEvent, Notifier};
use super::repo::{MessageRepo, MessageRepoError};
use super::types::{Delivery, DeliveryStatus, Message};
use crate::config::DeliveryConfig;
use crate::constituents::{ConstituentRepo, ConstituentRepoError, SenderProfile};
use crate::formfill::{
    base_fields, resolve_fields, FormFillClient, FormSchema, FormSubmission, SubmitOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Messages(#[from] MessageRepoError),
}

/// Final per-legislator outcome for a message.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeliveryReport {
    pub message_id: Uuid,
    pub attempts: i32,
    pub deliveries: Vec<Delivery>,
}

impl DeliveryReport {
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.status.is_sent()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.deliveries.len() - self.sent_count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.deliveries.iter().all(|d| d.status.is_sent())
    }
}

/// What a single attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The message is not queued, is leased elsewhere, or has no attempts left.
    NotClaimed,
    Attempted {
        attempt: i32,
        sent: usize,
        failed: usize,
    },
}

struct Outcome {
    legislator_id: Uuid,
    status: DeliveryStatus,
    response: Option<Value>,
}

impl Outcome {
    fn failed(delivery: &Delivery, detail: impl Into<String>) -> Self {
        Self {
            legislator_id: delivery.legislator_id,
            status: DeliveryStatus::Failed {
                detail: detail.into(),
            },
            response: None,
        }
    }
}

pub struct DeliveryOrchestrator {
    messages: Arc<dyn MessageRepo>,
    constituents: Arc<dyn ConstituentRepo>,
    form_fill: Arc<dyn FormFillClient>,
    notifier: Arc<dyn Notifier>,
    config: DeliveryConfig,
    send_campaign_tag: bool,
}

impl DeliveryOrchestrator {
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepo>,
        constituents: Arc<dyn ConstituentRepo>,
        form_fill: Arc<dyn FormFillClient>,
        notifier: Arc<dyn Notifier>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            messages,
            constituents,
            form_fill,
            notifier,
            config,
            send_campaign_tag: false,
        }
    }

    /// Tag submissions with the message's email uid.
    #[must_use]
    pub const fn with_campaign_tag(mut self, enabled: bool) -> Self {
        self.send_campaign_tag = enabled;
        self
    }

    /// Attempt until done, then finalize.
    ///
    /// Returns the report when this call finalized the message, `None` when
    /// the message was not ours to deliver (not queued, or leased by another
    /// worker).
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` on storage failures. Form-filling failures are
    /// recorded on the delivery rows instead.
    pub async fn run(&self, message_id: Uuid) -> Result<Option<DeliveryReport>, DeliveryError> {
        loop {
            match self.attempt(message_id).await? {
                AttemptOutcome::NotClaimed => {
                    let message = self.messages.get_message(message_id).await?;
                    if self.out_of_attempts(&message) {
                        return self.finalize(message_id, message.delivery_attempts).await;
                    }
                    tracing::debug!(%message_id, status = %message.status, "message not claimable");
                    return Ok(None);
                }
                AttemptOutcome::Attempted { attempt, failed, .. } => {
                    if failed == 0 || attempt >= self.max_attempts() {
                        return self.finalize(message_id, attempt).await;
                    }
                    tracing::info!(
                        %message_id,
                        attempt,
                        failed,
                        retry_in_ms = self.config.retry_delay_ms,
                        "delivery attempt incomplete, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
            }
        }
    }

    /// One claimed attempt over every unsent delivery.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` on storage failures.
    pub async fn attempt(&self, message_id: Uuid) -> Result<AttemptOutcome, DeliveryError> {
        let Some(attempt) = self
            .messages
            .begin_attempt(
                message_id,
                self.config.max_attempts,
                self.config.lease(),
                Utc::now(),
            )
            .await?
        else {
            return Ok(AttemptOutcome::NotClaimed);
        };

        let result = self.attempt_claimed(message_id, attempt).await;

        if let Err(e) = self.messages.end_attempt(message_id, attempt).await {
            tracing::warn!(%message_id, error = %e, "failed to release delivery lease");
        }
        result
    }

    async fn attempt_claimed(
        &self,
        message_id: Uuid,
        attempt: i32,
    ) -> Result<AttemptOutcome, DeliveryError> {
        let message = self.messages.get_message(message_id).await?;
        let deliveries = self.messages.list_deliveries(message_id).await?;
        let unsent: Vec<&Delivery> = deliveries.iter().filter(|d| !d.status.is_sent()).collect();

        tracing::info!(%message_id, attempt, unsent = unsent.len(), "delivery attempt");

        if unsent.is_empty() {
            return Ok(AttemptOutcome::Attempted {
                attempt,
                sent: 0,
                failed: 0,
            });
        }

        let outcomes = match self.sender_profile(&message).await {
            Ok(sender) => self.submit_all(&message, &sender, &unsent).await,
            Err(e) => {
                tracing::error!(%message_id, error = %e, "sender profile unavailable");
                unsent
                    .iter()
                    .map(|d| Outcome::failed(d, format!("sender profile unavailable: {e}")))
                    .collect()
            }
        };

        let mut sent = 0;
        for outcome in &outcomes {
            if outcome.status.is_sent() {
                sent += 1;
            }
            self.messages
                .record_delivery_result(
                    message_id,
                    outcome.legislator_id,
                    &outcome.status,
                    outcome.response.as_ref(),
                )
                .await?;
        }

        Ok(AttemptOutcome::Attempted {
            attempt,
            sent,
            failed: outcomes.len() - sent,
        })
    }

    async fn sender_profile(&self, message: &Message) -> Result<SenderProfile, ConstituentRepoError> {
        let constituent = self.constituents.get_constituent(message.constituent_id).await?;
        let address = self.constituents.get_address(message.address_id).await?;
        Ok(SenderProfile {
            constituent,
            address,
        })
    }

    async fn submit_all(
        &self,
        message: &Message,
        sender: &SenderProfile,
        unsent: &[&Delivery],
    ) -> Vec<Outcome> {
        let bioguide_ids: Vec<String> = unsent.iter().map(|d| d.bioguide_id.clone()).collect();

        let schemas = match self.form_fill.discover_fields(&bioguide_ids).await {
            Ok(schemas) => schemas,
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "form discovery failed");
                return unsent
                    .iter()
                    .map(|d| Outcome::failed(d, format!("form discovery failed: {e}")))
                    .collect();
            }
        };

        let base = base_fields(sender, message);
        let submissions = unsent.iter().map(|delivery| {
            let schema = schemas.get(&delivery.bioguide_id);
            let base = &base;
            async move {
                match schema {
                    Some(schema) => self.submit_one(message, delivery, schema, base).await,
                    None => {
                        tracing::warn!(
                            message_id = %message.id,
                            bioguide_id = %delivery.bioguide_id,
                            "no form schema returned"
                        );
                        Outcome::failed(delivery, "no form schema returned")
                    }
                }
            }
        });

        join_all(submissions).await
    }

    async fn submit_one(
        &self,
        message: &Message,
        delivery: &Delivery,
        schema: &FormSchema,
        base: &std::collections::BTreeMap<String, String>,
    ) -> Outcome {
        let form = resolve_fields(&delivery.bioguide_id, schema, base, message);
        let submission = FormSubmission {
            bio_id: delivery.bioguide_id.clone(),
            fields: form.fields,
            campaign_tag: self
                .send_campaign_tag
                .then(|| message.email_uid.clone()),
        };

        match self.form_fill.submit(&submission).await {
            Ok(outcome) => outcome_for(delivery, outcome),
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    bioguide_id = %delivery.bioguide_id,
                    error = %e,
                    "form submission failed"
                );
                Outcome {
                    legislator_id: delivery.legislator_id,
                    status: DeliveryStatus::Failed {
                        detail: e.to_string(),
                    },
                    response: Some(json!({ "error": e.to_string() })),
                }
            }
        }
    }

    async fn finalize(
        &self,
        message_id: Uuid,
        attempts: i32,
    ) -> Result<Option<DeliveryReport>, DeliveryError> {
        if !self.messages.finalize(message_id, Utc::now()).await? {
            tracing::debug!(%message_id, "message finalized elsewhere or still leased");
            return Ok(None);
        }

        let message = self.messages.get_message(message_id).await?;
        let report = DeliveryReport {
            message_id,
            attempts,
            deliveries: self.messages.list_deliveries(message_id).await?,
        };

        if report.is_complete() {
            tracing::info!(%message_id, attempts, sent = report.sent_count(), "message delivered");
        } else {
            tracing::error!(
                %message_id,
                attempts,
                sent = report.sent_count(),
                failed = report.failed_count(),
                "delivery retries exhausted"
            );
        }

        emit(
            self.notifier.as_ref(),
            NotificationEvent::SendStatus {
                constituent_id: message.constituent_id,
                report: report.clone(),
            },
        )
        .await;

        Ok(Some(report))
    }

    fn max_attempts(&self) -> i32 {
        i32::try_from(self.config.max_attempts).unwrap_or(i32::MAX)
    }

    fn out_of_attempts(&self, message: &Message) -> bool {
        message.status == super::types::MessageStatus::Queued
            && message.delivery_attempts >= self.max_attempts()
    }
}

fn outcome_for(delivery: &Delivery, outcome: SubmitOutcome) -> Outcome {
    let status = if outcome.is_success() {
        DeliveryStatus::Sent
    } else {
        let detail = outcome
            .detail
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("form submission rejected")
            .to_string();
        DeliveryStatus::Failed { detail }
    };
    Outcome {
        legislator_id: delivery.legislator_id,
        status,
        response: Some(outcome.detail),
    }
}
