//! District lookup API client.
//!
//! This module provides a trait-based HTTP client for the external service
//! that maps zip codes and coordinates to congressional districts. The trait
//! abstraction enables:
//!
//! - Easy mocking in unit tests
//! - HTTP-level testing with `wiremock` in integration tests
//! - Swapping implementations (e.g., different API providers)
//!
//! # Example
//!
//! ```ignore
//! use emailcongress_api::congress::{CongressApiClient, HttpCongressClient};
//!
//! let client = HttpCongressClient::new("https://congress.example.org", "my-api-key");
//! let candidates = client.locate_districts_by_zip("22201").await?;
//! ```

use async_trait::async_trait;
use thiserror::Error;

use super::types::{DistrictCandidate, DistrictsResponse};
use crate::config::CongressApiConfig;
use crate::geocode::Coordinates;

/// Errors that can occur when calling the district lookup API.
#[derive(Debug, Error)]
pub enum CongressApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
}

/// District lookup operations.
///
/// Use [`HttpCongressClient`] for real HTTP calls, or
/// [`mock::MockCongressClient`] for testing.
#[async_trait]
pub trait CongressApiClient: Send + Sync {
    /// All districts that intersect a 5-digit zip code. May be empty or
    /// contain several entries when the zip spans district lines.
    async fn locate_districts_by_zip(
        &self,
        zip5: &str,
    ) -> Result<Vec<DistrictCandidate>, CongressApiError>;

    /// Districts containing a point, best match first.
    async fn locate_districts_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<Vec<DistrictCandidate>, CongressApiError>;
}

/// HTTP-based implementation of [`CongressApiClient`].
pub struct HttpCongressClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCongressClient {
    /// Create a new client with the given base URL and API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create a client with a custom `reqwest::Client` (for testing with custom config).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from configuration with its request timeout applied.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_config(config: &CongressApiConfig) -> Result<Self, CongressApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self::with_client(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
        ))
    }

    async fn locate(
        &self,
        params: &[(&str, String)],
    ) -> Result<Vec<DistrictCandidate>, CongressApiError> {
        let url = format!("{}/districts/locate", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(params)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CongressApiError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let districts: DistrictsResponse = response.json().await?;
        Ok(districts.results)
    }
}

#[async_trait]
impl CongressApiClient for HttpCongressClient {
    async fn locate_districts_by_zip(
        &self,
        zip5: &str,
    ) -> Result<Vec<DistrictCandidate>, CongressApiError> {
        self.locate(&[("zip", zip5.to_string())]).await
    }

    async fn locate_districts_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<Vec<DistrictCandidate>, CongressApiError> {
        self.locate(&[
            ("latitude", coordinates.latitude.to_string()),
            ("longitude", coordinates.longitude.to_string()),
        ])
        .await
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
    //! Mock implementation for unit testing.

    use super::{CongressApiClient, CongressApiError, Coordinates, DistrictCandidate};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mock implementation of `CongressApiClient` for unit tests.
    ///
    /// Configure responses with `set_*_result` methods and verify
    /// calls with `zip_calls()` and `coordinate_calls()`. Unset results
    /// answer with an empty candidate list.
    pub struct MockCongressClient {
        zip_result: Mutex<Option<Result<Vec<DistrictCandidate>, CongressApiError>>>,
        coordinate_result: Mutex<Option<Result<Vec<DistrictCandidate>, CongressApiError>>>,
        zip_calls: Mutex<Vec<String>>,
        coordinate_calls: Mutex<Vec<Coordinates>>,
    }

    impl MockCongressClient {
        pub fn new() -> Self {
            Self {
                zip_result: Mutex::new(None),
                coordinate_result: Mutex::new(None),
                zip_calls: Mutex::new(Vec::new()),
                coordinate_calls: Mutex::new(Vec::new()),
            }
        }

        /// Set the result for `locate_districts_by_zip` calls.
        pub fn set_zip_result(&self, result: Result<Vec<DistrictCandidate>, CongressApiError>) {
            *self.zip_result.lock().unwrap() = Some(result);
        }

        /// Set the result for `locate_districts_by_coordinates` calls.
        pub fn set_coordinate_result(
            &self,
            result: Result<Vec<DistrictCandidate>, CongressApiError>,
        ) {
            *self.coordinate_result.lock().unwrap() = Some(result);
        }

        /// Get all zip codes passed to `locate_districts_by_zip`.
        pub fn zip_calls(&self) -> Vec<String> {
            self.zip_calls.lock().unwrap().clone()
        }

        /// Get all coordinates passed to `locate_districts_by_coordinates`.
        pub fn coordinate_calls(&self) -> Vec<Coordinates> {
            self.coordinate_calls.lock().unwrap().clone()
        }
    }

    impl Default for MockCongressClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CongressApiClient for MockCongressClient {
        async fn locate_districts_by_zip(
            &self,
            zip5: &str,
        ) -> Result<Vec<DistrictCandidate>, CongressApiError> {
            self.zip_calls.lock().unwrap().push(zip5.to_string());

            self.zip_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn locate_districts_by_coordinates(
            &self,
            coordinates: Coordinates,
        ) -> Result<Vec<DistrictCandidate>, CongressApiError> {
            self.coordinate_calls.lock().unwrap().push(coordinates);

            self.coordinate_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
