//! Sliding-window send limit per constituent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::repo::{MessageRepo, MessageRepoError};
use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStatus {
    Free,
    Block,
}

/// Reads message history only, so concurrent checks for the same
/// constituent need no coordination.
pub struct RateLimiter {
    repo: Arc<dyn MessageRepo>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(repo: Arc<dyn MessageRepo>, config: RateLimitConfig) -> Self {
        Self { repo, config }
    }

    /// Count messages created in `[now - window, now]`; more than the
    /// configured maximum blocks.
    ///
    /// # Errors
    ///
    /// Returns `MessageRepoError` if the history cannot be read.
    pub async fn status(
        &self,
        constituent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, MessageRepoError> {
        let since = now - self.config.window();
        let count = self.repo.count_since(constituent_id, since).await?;

        if count > i64::from(self.config.max_per_interval) {
            tracing::info!(
                %constituent_id,
                count,
                max = self.config.max_per_interval,
                "sender over rate limit"
            );
            Ok(RateLimitStatus::Block)
        } else {
            Ok(RateLimitStatus::Free)
        }
    }
}
