//! Message and delivery persistence
//!
//! The `messages` table doubles as the durable delivery queue: a message in
//! status `queued` still owes an attempt. Attempts are claimed with a
//! time-bounded lease so only one runs per message at a time, across
//! processes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::types::{Delivery, DeliveryStatus, Message, MessageStatus, NewMessage};
use crate::congress::Legislator;

#[derive(Debug, thiserror::Error)]
pub enum MessageRepoError {
    #[error("message not found")]
    NotFound,
    #[error("corrupt message row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn create_message(&self, message: &NewMessage) -> Result<Message, MessageRepoError>;

    async fn get_message(&self, id: Uuid) -> Result<Message, MessageRepoError>;

    /// Messages by this constituent created at or after `since`.
    async fn count_since(
        &self,
        constituent_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, MessageRepoError>;

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), MessageRepoError>;

    /// One `unsent` row per legislator. Existing rows are left alone.
    async fn create_deliveries(
        &self,
        message_id: Uuid,
        legislators: &[Legislator],
    ) -> Result<(), MessageRepoError>;

    async fn list_deliveries(&self, message_id: Uuid) -> Result<Vec<Delivery>, MessageRepoError>;

    /// Record an outcome. A row already marked sent is never changed.
    async fn record_delivery_result(
        &self,
        message_id: Uuid,
        legislator_id: Uuid,
        status: &DeliveryStatus,
        response: Option<&Value>,
    ) -> Result<(), MessageRepoError>;

    /// Claim the next attempt: bumps the attempt counter and takes a lease.
    ///
    /// Returns the attempt number, or `None` when the message is not
    /// queued, is leased by someone else, or has used all its attempts.
    async fn begin_attempt(
        &self,
        message_id: Uuid,
        max_attempts: u32,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, MessageRepoError>;

    /// Release the lease taken by [`MessageRepo::begin_attempt`] for
    /// `attempt`. A lease taken since by a later attempt is left alone.
    async fn end_attempt(&self, message_id: Uuid, attempt: i32) -> Result<(), MessageRepoError>;

    /// Move a queued, unleased message to finalized. Returns `true` only for
    /// the call that made the transition.
    async fn finalize(&self, message_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, MessageRepoError>;

    /// Queued messages whose lease is free, oldest first.
    async fn list_queued(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, MessageRepoError>;

    /// Put a finalized message with unsent or failed rows back in the queue
    /// with a fresh attempt budget. Returns `false` if there is nothing to retry.
    async fn requeue(&self, message_id: Uuid) -> Result<bool, MessageRepoError>;
}

const MESSAGE_COLUMNS: &str = "id, constituent_id, address_id, to_originally, subject, body, \
                               email_uid, status, delivery_attempts, created_at";

fn map_message_row(row: &sqlx::postgres::PgRow) -> Result<Message, MessageRepoError> {
    let status: String = row.try_get("status")?;
    Ok(Message {
        id: row.try_get("id")?,
        constituent_id: row.try_get("constituent_id")?,
        address_id: row.try_get("address_id")?,
        to_originally: row.try_get("to_originally")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        email_uid: row.try_get("email_uid")?,
        status: status.parse().map_err(MessageRepoError::Corrupt)?,
        delivery_attempts: row.try_get("delivery_attempts")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_delivery_row(row: &sqlx::postgres::PgRow) -> Result<Delivery, MessageRepoError> {
    let status: String = row.try_get("status")?;
    let detail: Option<String> = row.try_get("detail")?;
    let status = match status.as_str() {
        "unsent" => DeliveryStatus::Unsent,
        "sent" => DeliveryStatus::Sent,
        "failed" => DeliveryStatus::Failed {
            detail: detail.unwrap_or_default(),
        },
        other => {
            return Err(MessageRepoError::Corrupt(format!(
                "unknown delivery status '{other}'"
            )))
        }
    };
    Ok(Delivery {
        message_id: row.try_get("message_id")?,
        legislator_id: row.try_get("legislator_id")?,
        bioguide_id: row.try_get("bioguide_id")?,
        status,
        response: row.try_get("response")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn lease_until(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(5))
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn create_message<'e, E>(
    executor: E,
    message: &NewMessage,
) -> Result<Message, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let id = Uuid::new_v4();
    sqlx::query(
        r"
        INSERT INTO messages (
            id, constituent_id, address_id, to_originally, subject, body, email_uid,
            status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'free', $8, $8)
        ",
    )
    .bind(id)
    .bind(message.constituent_id)
    .bind(message.address_id)
    .bind(&message.to_originally)
    .bind(&message.subject)
    .bind(&message.body)
    .bind(&message.email_uid)
    .bind(message.created_at)
    .execute(executor)
    .await?;

    Ok(Message {
        id,
        constituent_id: message.constituent_id,
        address_id: message.address_id,
        to_originally: message.to_originally.clone(),
        subject: message.subject.clone(),
        body: message.body.clone(),
        email_uid: message.email_uid.clone(),
        status: MessageStatus::Free,
        delivery_attempts: 0,
        created_at: message.created_at,
    })
}

/// # Errors
///
/// Returns `MessageRepoError::NotFound` if the message does not exist.
pub async fn get_message<'e, E>(executor: E, id: Uuid) -> Result<Message, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(MessageRepoError::NotFound)?;
    map_message_row(&row)
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn count_messages_since<'e, E>(
    executor: E,
    constituent_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE constituent_id = $1 AND created_at >= $2",
    )
    .bind(constituent_id)
    .bind(since)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

/// # Errors
///
/// Returns `MessageRepoError::NotFound` if the message does not exist.
pub async fn set_message_status<'e, E>(
    executor: E,
    id: Uuid,
    status: MessageStatus,
) -> Result<(), MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query("UPDATE messages SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(MessageRepoError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn create_deliveries<'e, E>(
    executor: E,
    message_id: Uuid,
    legislator_ids: &[Uuid],
) -> Result<(), MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    if legislator_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r"
        INSERT INTO message_deliveries (message_id, legislator_id, status)
        SELECT $1, legislator_id, 'unsent' FROM UNNEST($2::uuid[]) AS t(legislator_id)
        ON CONFLICT (message_id, legislator_id) DO NOTHING
        ",
    )
    .bind(message_id)
    .bind(legislator_ids)
    .execute(executor)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn list_deliveries<'e, E>(
    executor: E,
    message_id: Uuid,
) -> Result<Vec<Delivery>, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let rows = sqlx::query(
        r"
        SELECT d.message_id, d.legislator_id, l.bioguide_id, d.status, d.detail,
               d.response, d.updated_at
        FROM message_deliveries d
        JOIN legislators l ON l.id = d.legislator_id
        WHERE d.message_id = $1
        ORDER BY l.bioguide_id ASC
        ",
    )
    .bind(message_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_delivery_row).collect()
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn record_delivery_result<'e, E>(
    executor: E,
    message_id: Uuid,
    legislator_id: Uuid,
    status: &DeliveryStatus,
    response: Option<&Value>,
) -> Result<(), MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r"
        UPDATE message_deliveries
        SET status = $3, detail = $4, response = $5, updated_at = now()
        WHERE message_id = $1 AND legislator_id = $2 AND status <> 'sent'
        ",
    )
    .bind(message_id)
    .bind(legislator_id)
    .bind(status.as_str())
    .bind(status.detail())
    .bind(response)
    .execute(executor)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn begin_attempt<'e, E>(
    executor: E,
    message_id: Uuid,
    max_attempts: u32,
    lease: Duration,
    now: DateTime<Utc>,
) -> Result<Option<i32>, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
    let attempt: Option<i32> = sqlx::query_scalar(
        r"
        UPDATE messages
        SET delivery_attempts = delivery_attempts + 1, lease_expires_at = $2, updated_at = $3
        WHERE id = $1
          AND status = 'queued'
          AND delivery_attempts < $4
          AND (lease_expires_at IS NULL OR lease_expires_at <= $3)
        RETURNING delivery_attempts
        ",
    )
    .bind(message_id)
    .bind(lease_until(now, lease))
    .bind(now)
    .bind(max_attempts)
    .fetch_optional(executor)
    .await?;
    Ok(attempt)
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn end_attempt<'e, E>(
    executor: E,
    message_id: Uuid,
    attempt: i32,
) -> Result<(), MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r"
        UPDATE messages SET lease_expires_at = NULL, updated_at = now()
        WHERE id = $1 AND delivery_attempts = $2
        ",
    )
    .bind(message_id)
    .bind(attempt)
    .execute(executor)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn finalize_message<'e, E>(
    executor: E,
    message_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r"
        UPDATE messages
        SET status = 'finalized', lease_expires_at = NULL, updated_at = $2
        WHERE id = $1
          AND status = 'queued'
          AND (lease_expires_at IS NULL OR lease_expires_at <= $2)
        ",
    )
    .bind(message_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn list_queued<'e, E>(executor: E, now: DateTime<Utc>) -> Result<Vec<Uuid>, MessageRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r"
        SELECT id FROM messages
        WHERE status = 'queued' AND (lease_expires_at IS NULL OR lease_expires_at <= $1)
        ORDER BY created_at ASC
        ",
    )
    .bind(now)
    .fetch_all(executor)
    .await?;
    Ok(ids)
}

/// Requeue inside an open transaction.
///
/// # Errors
///
/// Returns `MessageRepoError::Database` on database failures.
pub async fn requeue_with_conn(
    conn: &mut sqlx::PgConnection,
    message_id: Uuid,
) -> Result<bool, MessageRepoError> {
    let result = sqlx::query(
        r"
        UPDATE messages
        SET status = 'queued', delivery_attempts = 0, lease_expires_at = NULL, updated_at = now()
        WHERE id = $1
          AND status = 'finalized'
          AND EXISTS (
              SELECT 1 FROM message_deliveries
              WHERE message_id = $1 AND status <> 'sent'
          )
        ",
    )
    .bind(message_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        r"
        UPDATE message_deliveries
        SET status = 'unsent', detail = NULL, updated_at = now()
        WHERE message_id = $1 AND status = 'failed'
        ",
    )
    .bind(message_id)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// `PostgreSQL` implementation of [`MessageRepo`].
pub struct PgMessageRepo {
    pool: PgPool,
}

impl PgMessageRepo {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepo for PgMessageRepo {
    async fn create_message(&self, message: &NewMessage) -> Result<Message, MessageRepoError> {
        create_message(&self.pool, message).await
    }

    async fn get_message(&self, id: Uuid) -> Result<Message, MessageRepoError> {
        get_message(&self.pool, id).await
    }

    async fn count_since(
        &self,
        constituent_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, MessageRepoError> {
        count_messages_since(&self.pool, constituent_id, since).await
    }

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), MessageRepoError> {
        set_message_status(&self.pool, id, status).await
    }

    async fn create_deliveries(
        &self,
        message_id: Uuid,
        legislators: &[Legislator],
    ) -> Result<(), MessageRepoError> {
        let ids: Vec<Uuid> = legislators.iter().map(|l| l.id).collect();
        create_deliveries(&self.pool, message_id, &ids).await
    }

    async fn list_deliveries(&self, message_id: Uuid) -> Result<Vec<Delivery>, MessageRepoError> {
        list_deliveries(&self.pool, message_id).await
    }

    async fn record_delivery_result(
        &self,
        message_id: Uuid,
        legislator_id: Uuid,
        status: &DeliveryStatus,
        response: Option<&Value>,
    ) -> Result<(), MessageRepoError> {
        record_delivery_result(&self.pool, message_id, legislator_id, status, response).await
    }

    async fn begin_attempt(
        &self,
        message_id: Uuid,
        max_attempts: u32,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, MessageRepoError> {
        begin_attempt(&self.pool, message_id, max_attempts, lease, now).await
    }

    async fn end_attempt(&self, message_id: Uuid, attempt: i32) -> Result<(), MessageRepoError> {
        end_attempt(&self.pool, message_id, attempt).await
    }

    async fn finalize(
        &self,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, MessageRepoError> {
        finalize_message(&self.pool, message_id, now).await
    }

    async fn list_queued(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, MessageRepoError> {
        list_queued(&self.pool, now).await
    }

    async fn requeue(&self, message_id: Uuid) -> Result<bool, MessageRepoError> {
        let mut tx = self.pool.begin().await?;
        let requeued = requeue_with_conn(&mut tx, message_id).await?;
        tx.commit().await?;
        Ok(requeued)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub mod mock {
    //! In-memory message repo with the same state rules as the Postgres one.

    use super::{
        async_trait, lease_until, DateTime, Delivery, DeliveryStatus, Duration, Legislator,
        Message, MessageRepo, MessageRepoError, MessageStatus, NewMessage, Utc, Uuid, Value,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        messages: HashMap<Uuid, (Message, Option<DateTime<Utc>>)>,
        deliveries: Vec<Delivery>,
        finalize_calls: usize,
    }

    #[derive(Default)]
    pub struct MockMessageRepo {
        state: Mutex<State>,
    }

    impl MockMessageRepo {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Store a message as-is, bypassing creation defaults.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        pub fn insert_message(&self, message: Message) {
            self.state
                .lock()
                .expect("lock poisoned")
                .messages
                .insert(message.id, (message, None));
        }

        /// Overwrite a delivery's status regardless of its current state.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        pub fn force_delivery_status(
            &self,
            message_id: Uuid,
            legislator_id: Uuid,
            status: DeliveryStatus,
        ) {
            let mut state = self.state.lock().expect("lock poisoned");
            if let Some(d) = state
                .deliveries
                .iter_mut()
                .find(|d| d.message_id == message_id && d.legislator_id == legislator_id)
            {
                d.status = status;
            }
        }

        /// Current lease expiry, if any.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        #[must_use]
        pub fn lease_of(&self, message_id: Uuid) -> Option<DateTime<Utc>> {
            self.state
                .lock()
                .expect("lock poisoned")
                .messages
                .get(&message_id)
                .and_then(|(_, lease)| *lease)
        }

        /// Number of `finalize` calls that made the transition.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        #[must_use]
        pub fn finalize_count(&self) -> usize {
            self.state.lock().expect("lock poisoned").finalize_calls
        }
    }

    #[async_trait]
    impl MessageRepo for MockMessageRepo {
        async fn create_message(&self, message: &NewMessage) -> Result<Message, MessageRepoError> {
            let created = Message {
                id: Uuid::new_v4(),
                constituent_id: message.constituent_id,
                address_id: message.address_id,
                to_originally: message.to_originally.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                email_uid: message.email_uid.clone(),
                status: MessageStatus::Free,
                delivery_attempts: 0,
                created_at: message.created_at,
            };
            self.insert_message(created.clone());
            Ok(created)
        }

        async fn get_message(&self, id: Uuid) -> Result<Message, MessageRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            state
                .messages
                .get(&id)
                .map(|(m, _)| m.clone())
                .ok_or(MessageRepoError::NotFound)
        }

        async fn count_since(
            &self,
            constituent_id: Uuid,
            since: DateTime<Utc>,
        ) -> Result<i64, MessageRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            let count = state
                .messages
                .values()
                .filter(|(m, _)| m.constituent_id == constituent_id && m.created_at >= since)
                .count();
            Ok(i64::try_from(count).unwrap_or(i64::MAX))
        }

        async fn set_status(
            &self,
            id: Uuid,
            status: MessageStatus,
        ) -> Result<(), MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let (message, _) = state
                .messages
                .get_mut(&id)
                .ok_or(MessageRepoError::NotFound)?;
            message.status = status;
            Ok(())
        }

        async fn create_deliveries(
            &self,
            message_id: Uuid,
            legislators: &[Legislator],
        ) -> Result<(), MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            for legislator in legislators {
                let exists = state
                    .deliveries
                    .iter()
                    .any(|d| d.message_id == message_id && d.legislator_id == legislator.id);
                if !exists {
                    state.deliveries.push(Delivery {
                        message_id,
                        legislator_id: legislator.id,
                        bioguide_id: legislator.bioguide_id.clone(),
                        status: DeliveryStatus::Unsent,
                        response: None,
                        updated_at: Utc::now(),
                    });
                }
            }
            Ok(())
        }

        async fn list_deliveries(
            &self,
            message_id: Uuid,
        ) -> Result<Vec<Delivery>, MessageRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            let mut deliveries: Vec<Delivery> = state
                .deliveries
                .iter()
                .filter(|d| d.message_id == message_id)
                .cloned()
                .collect();
            deliveries.sort_by(|a, b| a.bioguide_id.cmp(&b.bioguide_id));
            Ok(deliveries)
        }

        async fn record_delivery_result(
            &self,
            message_id: Uuid,
            legislator_id: Uuid,
            status: &DeliveryStatus,
            response: Option<&Value>,
        ) -> Result<(), MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            if let Some(d) = state.deliveries.iter_mut().find(|d| {
                d.message_id == message_id && d.legislator_id == legislator_id && !d.status.is_sent()
            }) {
                d.status = status.clone();
                d.response = response.cloned();
                d.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn begin_attempt(
            &self,
            message_id: Uuid,
            max_attempts: u32,
            lease: Duration,
            now: DateTime<Utc>,
        ) -> Result<Option<i32>, MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let Some((message, held)) = state.messages.get_mut(&message_id) else {
                return Ok(None);
            };
            let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
            let lease_free = held.is_none_or(|until| until <= now);
            if message.status != MessageStatus::Queued
                || message.delivery_attempts >= max_attempts
                || !lease_free
            {
                return Ok(None);
            }
            message.delivery_attempts += 1;
            *held = Some(lease_until(now, lease));
            Ok(Some(message.delivery_attempts))
        }

        async fn end_attempt(
            &self,
            message_id: Uuid,
            attempt: i32,
        ) -> Result<(), MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            if let Some((message, held)) = state.messages.get_mut(&message_id) {
                if message.delivery_attempts == attempt {
                    *held = None;
                }
            }
            Ok(())
        }

        async fn finalize(
            &self,
            message_id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<bool, MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let transitioned = match state.messages.get_mut(&message_id) {
                Some((message, held))
                    if message.status == MessageStatus::Queued
                        && held.is_none_or(|until| until <= now) =>
                {
                    message.status = MessageStatus::Finalized;
                    *held = None;
                    true
                }
                _ => false,
            };
            if transitioned {
                state.finalize_calls += 1;
            }
            Ok(transitioned)
        }

        async fn list_queued(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, MessageRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            let mut queued: Vec<&Message> = state
                .messages
                .values()
                .filter(|(m, held)| {
                    m.status == MessageStatus::Queued && held.is_none_or(|until| until <= now)
                })
                .map(|(m, _)| m)
                .collect();
            queued.sort_by_key(|m| m.created_at);
            Ok(queued.into_iter().map(|m| m.id).collect())
        }

        async fn requeue(&self, message_id: Uuid) -> Result<bool, MessageRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let has_unsent = state
                .deliveries
                .iter()
                .any(|d| d.message_id == message_id && !d.status.is_sent());
            let Some((message, held)) = state.messages.get_mut(&message_id) else {
                return Ok(false);
            };
            if message.status != MessageStatus::Finalized || !has_unsent {
                return Ok(false);
            }
            message.status = MessageStatus::Queued;
            message.delivery_attempts = 0;
            *held = None;
            for d in state
                .deliveries
                .iter_mut()
                .filter(|d| d.message_id == message_id)
            {
                if matches!(d.status, DeliveryStatus::Failed { .. }) {
                    d.status = DeliveryStatus::Unsent;
                }
            }
            Ok(true)
        }
    }
}
