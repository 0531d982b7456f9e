//! Form-filling service client.
//!
//! Two calls: a batched schema discovery for a set of legislators and one
//! form submission per legislator. Requests carry the configured timeout;
//! nothing here retries.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use super::types::{FormSchema, FormSubmission, SubmitOutcome};
use crate::config::FormFillConfig;

#[derive(Debug, Error)]
pub enum FormFillError {
    #[error("form fill request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("malformed form fill response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FormFillError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

#[async_trait]
pub trait FormFillClient: Send + Sync {
    /// Required form steps keyed by bioguide id. Ids the service does not
    /// know are simply absent from the map.
    async fn discover_fields(
        &self,
        bioguide_ids: &[String],
    ) -> Result<HashMap<String, FormSchema>, FormFillError>;

    /// Submit one filled form. A `Failure` outcome is a normal answer; only
    /// transport and protocol problems are errors.
    async fn submit(&self, submission: &FormSubmission) -> Result<SubmitOutcome, FormFillError>;
}

/// HTTP implementation of [`FormFillClient`].
pub struct HttpFormFillClient {
    client: reqwest::Client,
    config: FormFillConfig,
}

impl HttpFormFillClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: FormFillConfig) -> Result<Self, FormFillError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FormFillError::Request)?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client, config: FormFillConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, FormFillError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FormFillError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| FormFillError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl FormFillClient for HttpFormFillClient {
    async fn discover_fields(
        &self,
        bioguide_ids: &[String],
    ) -> Result<HashMap<String, FormSchema>, FormFillError> {
        let body = self
            .post_json(&self.config.discover_path, &json!({ "bio_ids": bioguide_ids }))
            .await?;
        serde_json::from_value(body).map_err(|e| FormFillError::Malformed(e.to_string()))
    }

    async fn submit(&self, submission: &FormSubmission) -> Result<SubmitOutcome, FormFillError> {
        let body =
            serde_json::to_value(submission).map_err(|e| FormFillError::Malformed(e.to_string()))?;
        let response = self.post_json(&self.config.submit_path, &body).await?;
        Ok(SubmitOutcome::from_response(response))
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::missing_const_for_fn,
    clippy::must_use_candidate
)]
pub mod mock {
    //! Scriptable form-filling service.

    use super::{async_trait, FormFillClient, FormFillError, FormSchema, FormSubmission, HashMap};
    use crate::formfill::types::SubmitOutcome;
    use serde_json::json;
    use std::sync::Mutex;

    /// Responses keyed by bioguide id.
    ///
    /// Unlike the one-shot mocks elsewhere, results here are sticky so a
    /// whole retry loop can run against one setup. Legislators without a
    /// scripted submit result succeed.
    #[derive(Default)]
    pub struct MockFormFillClient {
        schemas: Mutex<HashMap<String, FormSchema>>,
        unknown: Mutex<Vec<String>>,
        discover_failure: Mutex<Option<String>>,
        submit_results: Mutex<HashMap<String, Result<SubmitOutcome, String>>>,
        timeout_all: Mutex<bool>,
        discover_calls: Mutex<Vec<Vec<String>>>,
        submit_calls: Mutex<Vec<FormSubmission>>,
    }

    impl MockFormFillClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_schema(&self, bioguide_id: &str, schema: FormSchema) {
            self.schemas
                .lock()
                .unwrap()
                .insert(bioguide_id.to_string(), schema);
        }

        /// Leave this legislator out of discovery responses.
        pub fn mark_unknown(&self, bioguide_id: &str) {
            self.unknown.lock().unwrap().push(bioguide_id.to_string());
        }

        /// Make every discovery call fail with an API error.
        pub fn fail_discovery(&self, message: &str) {
            *self.discover_failure.lock().unwrap() = Some(message.to_string());
        }

        /// Answer submissions for this legislator with a failure status.
        pub fn reject(&self, bioguide_id: &str, message: &str) {
            self.submit_results.lock().unwrap().insert(
                bioguide_id.to_string(),
                Ok(SubmitOutcome::from_response(
                    json!({"status": "error", "message": message}),
                )),
            );
        }

        /// Make submissions for this legislator fail at the transport level.
        pub fn error_for(&self, bioguide_id: &str, message: &str) {
            self.submit_results
                .lock()
                .unwrap()
                .insert(bioguide_id.to_string(), Err(message.to_string()));
        }

        /// Every call times out.
        pub fn time_out_everything(&self) {
            *self.timeout_all.lock().unwrap() = true;
        }

        pub fn discover_calls(&self) -> Vec<Vec<String>> {
            self.discover_calls.lock().unwrap().clone()
        }

        pub fn submit_calls(&self) -> Vec<FormSubmission> {
            self.submit_calls.lock().unwrap().clone()
        }

        pub fn submissions_for(&self, bioguide_id: &str) -> usize {
            self.submit_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.bio_id == bioguide_id)
                .count()
        }
    }

    #[async_trait]
    impl FormFillClient for MockFormFillClient {
        async fn discover_fields(
            &self,
            bioguide_ids: &[String],
        ) -> Result<HashMap<String, FormSchema>, FormFillError> {
            self.discover_calls
                .lock()
                .unwrap()
                .push(bioguide_ids.to_vec());
            if *self.timeout_all.lock().unwrap() {
                return Err(FormFillError::Timeout);
            }
            if let Some(message) = self.discover_failure.lock().unwrap().clone() {
                return Err(FormFillError::ApiError {
                    status: 500,
                    message,
                });
            }
            let schemas = self.schemas.lock().unwrap();
            let unknown = self.unknown.lock().unwrap();
            Ok(bioguide_ids
                .iter()
                .filter(|id| !unknown.contains(*id))
                .map(|id| (id.clone(), schemas.get(id).cloned().unwrap_or_default()))
                .collect())
        }

        async fn submit(
            &self,
            submission: &FormSubmission,
        ) -> Result<SubmitOutcome, FormFillError> {
            self.submit_calls.lock().unwrap().push(submission.clone());
            if *self.timeout_all.lock().unwrap() {
                return Err(FormFillError::Timeout);
            }
            match self.submit_results.lock().unwrap().get(&submission.bio_id) {
                Some(Ok(outcome)) => Ok(outcome.clone()),
                Some(Err(message)) => Err(FormFillError::Malformed(message.clone())),
                None => Ok(SubmitOutcome::from_response(json!({"status": "success"}))),
            }
        }
    }
}
