//! Message and per-legislator delivery types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a message sits in the delivery lifecycle.
///
/// `Free` and `Blocked` are set by the rate limiter when the message is
/// processed; only a free message with contactable recipients becomes
/// `Queued`; `Finalized` follows the final send-status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Free,
    Blocked,
    Queued,
    Finalized,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Blocked => "blocked",
            Self::Queued => "queued",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "blocked" => Ok(Self::Blocked),
            "queued" => Ok(Self::Queued),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub constituent_id: Uuid,
    /// Address generation the message was written under
    pub address_id: Uuid,
    /// Recipients as submitted, before bucketing
    pub to_originally: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Correlation id of the inbound email
    pub email_uid: String,
    pub status: MessageStatus,
    pub delivery_attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub constituent_id: Uuid,
    pub address_id: Uuid,
    pub to_originally: Vec<String>,
    pub subject: String,
    pub body: String,
    pub email_uid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Unsent,
    Sent,
    Failed { detail: String },
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Sent => "sent",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed { detail } => Some(detail),
            _ => None,
        }
    }
}

/// One (message, legislator) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Delivery {
    pub message_id: Uuid,
    pub legislator_id: Uuid,
    pub bioguide_id: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
    /// Raw payload from the form-filling service
    pub response: Option<Value>,
    pub updated_at: DateTime<Utc>,
}
