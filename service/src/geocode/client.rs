//! Geocoding client.
//!
//! One HTTP call per operation, bounded by the configured timeout. The
//! adapter never retries and never returns partially populated results:
//! anything short of a complete, usable answer is a [`GeocodeError`].

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    AddressQuery, Coordinates, GeocodeResponse, ReverseAddress, ReverseGeocodeResponse,
};
use crate::config::GeocoderConfig;

/// Errors that can occur when calling the geocoder.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The request did not complete within the configured timeout
    #[error("geocoder timed out")]
    Timeout,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Geocoder returned a non-success status
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Response body could not be understood
    #[error("malformed geocoder response: {0}")]
    Malformed(String),

    /// Geocoder answered but found nothing usable
    #[error("no usable match for address")]
    NoMatch,
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Request(err)
        }
    }
}

/// Address resolver operations.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve structured address fields to coordinates.
    async fn geocode(&self, address: &AddressQuery) -> Result<Coordinates, GeocodeError>;

    /// Resolve coordinates to a postal address. `state_hint` fills in the
    /// state when the service omits it.
    async fn reverse_geocode(
        &self,
        coordinates: Coordinates,
        state_hint: Option<&str>,
    ) -> Result<ReverseAddress, GeocodeError>;
}

/// Texas A&M geoservices implementation of [`Geocoder`].
pub struct HttpGeocoder {
    client: reqwest::Client,
    config: GeocoderConfig,
}

impl HttpGeocoder {
    /// Create a client whose requests time out after `config.timeout()`.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(GeocodeError::Request)?;
        Ok(Self { client, config })
    }

    /// Create a client with a custom `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, config: GeocoderConfig) -> Self {
        Self { client, config }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, GeocodeError> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("apiKey", self.config.api_key.as_str()),
                ("version", self.config.version.as_str()),
                ("format", "json"),
            ])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GeocodeError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, address: &AddressQuery) -> Result<Coordinates, GeocodeError> {
        let params = [
            ("streetAddress", address.street_address.clone()),
            ("city", address.city.clone()),
            ("state", address.state.clone()),
            ("zip", address.zip5.clone()),
        ];
        let response: GeocodeResponse = self.get_json(&self.config.geocode_url, &params).await?;

        let geocode = response
            .output_geocodes
            .into_iter()
            .next()
            .ok_or(GeocodeError::NoMatch)?
            .output_geocode;

        let coordinates = Coordinates {
            latitude: geocode.latitude,
            longitude: geocode.longitude,
        };
        if !coordinates.is_usable() {
            tracing::debug!(?coordinates, "geocoder returned unusable coordinates");
            return Err(GeocodeError::NoMatch);
        }
        Ok(coordinates)
    }

    async fn reverse_geocode(
        &self,
        coordinates: Coordinates,
        state_hint: Option<&str>,
    ) -> Result<ReverseAddress, GeocodeError> {
        let params = [
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
        ];
        let response: ReverseGeocodeResponse = self
            .get_json(&self.config.reverse_geocode_url, &params)
            .await?;

        let entry = response
            .street_addresses
            .into_iter()
            .next()
            .ok_or(GeocodeError::NoMatch)?;

        let state = if entry.state.trim().is_empty() {
            state_hint.unwrap_or_default().to_string()
        } else {
            entry.state
        };

        if entry.city.trim().is_empty() || state.trim().is_empty() || entry.zip.len() != 5 {
            return Err(GeocodeError::Malformed(
                "reverse geocode result is missing city, state or zip".to_string(),
            ));
        }

        Ok(ReverseAddress {
            street_address: entry.street_address,
            city: entry.city,
            state,
            zip5: entry.zip,
            zip4: entry
                .zip_plus4
                .filter(|z| z.len() == 4 && z.chars().all(|c| c.is_ascii_digit())),
        })
    }
}

/// Infer a zip+4 extension by geocoding the address and reverse geocoding the result.
///
/// # Errors
/// Propagates geocoder failures; returns [`GeocodeError::NoMatch`] when the
/// reverse lookup has no +4 extension.
pub async fn infer_zip4(
    geocoder: &dyn Geocoder,
    address: &AddressQuery,
) -> Result<String, GeocodeError> {
    let coordinates = geocoder.geocode(address).await?;
    let reverse = geocoder
        .reverse_geocode(coordinates, Some(&address.state))
        .await?;
    reverse.zip4.ok_or(GeocodeError::NoMatch)
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

    use super::{AddressQuery, Coordinates, GeocodeError, Geocoder, ReverseAddress};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mock implementation of [`Geocoder`].
    ///
    /// Results are one-shot: once consumed, later calls fall back to
    /// [`GeocodeError::NoMatch`]. Calls are recorded for assertions.
    pub struct MockGeocoder {
        geocode_result: Mutex<Option<Result<Coordinates, GeocodeError>>>,
        reverse_result: Mutex<Option<Result<ReverseAddress, GeocodeError>>>,
        geocode_calls: Mutex<Vec<AddressQuery>>,
        reverse_calls: Mutex<Vec<Coordinates>>,
    }

    impl MockGeocoder {
        pub fn new() -> Self {
            Self {
                geocode_result: Mutex::new(None),
                reverse_result: Mutex::new(None),
                geocode_calls: Mutex::new(Vec::new()),
                reverse_calls: Mutex::new(Vec::new()),
            }
        }

        pub fn set_geocode_result(&self, result: Result<Coordinates, GeocodeError>) {
            *self.geocode_result.lock().unwrap() = Some(result);
        }

        pub fn set_reverse_result(&self, result: Result<ReverseAddress, GeocodeError>) {
            *self.reverse_result.lock().unwrap() = Some(result);
        }

        pub fn geocode_calls(&self) -> Vec<AddressQuery> {
            self.geocode_calls.lock().unwrap().clone()
        }

        pub fn reverse_calls(&self) -> Vec<Coordinates> {
            self.reverse_calls.lock().unwrap().clone()
        }
    }

    impl Default for MockGeocoder {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Geocoder for MockGeocoder {
        async fn geocode(&self, address: &AddressQuery) -> Result<Coordinates, GeocodeError> {
            self.geocode_calls.lock().unwrap().push(address.clone());
            self.geocode_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(GeocodeError::NoMatch))
        }

        async fn reverse_geocode(
            &self,
            coordinates: Coordinates,
            _state_hint: Option<&str>,
        ) -> Result<ReverseAddress, GeocodeError> {
            self.reverse_calls.lock().unwrap().push(coordinates);
            self.reverse_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(GeocodeError::NoMatch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockGeocoder;
    use super::*;

    #[test]
    fn zero_coordinates_are_not_usable() {
        let origin = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(!origin.is_usable());
        let nan = Coordinates {
            latitude: f64::NAN,
            longitude: -77.0,
        };
        assert!(!nan.is_usable());
        let capitol = Coordinates {
            latitude: 38.8899,
            longitude: -77.0091,
        };
        assert!(capitol.is_usable());
    }

    #[tokio::test]
    async fn infer_zip4_reads_reverse_lookup() {
        let geocoder = MockGeocoder::new();
        geocoder.set_geocode_result(Ok(Coordinates {
            latitude: 38.8899,
            longitude: -77.0091,
        }));
        geocoder.set_reverse_result(Ok(ReverseAddress {
            street_address: "First St SE".into(),
            city: "Washington".into(),
            state: "DC".into(),
            zip5: "20004".into(),
            zip4: Some("0001".into()),
        }));

        let query = AddressQuery {
            street_address: "First St SE".into(),
            city: "Washington".into(),
            state: "DC".into(),
            zip5: "20004".into(),
        };
        let zip4 = infer_zip4(&geocoder, &query).await.unwrap();
        assert_eq!(zip4, "0001");
        assert_eq!(geocoder.geocode_calls().len(), 1);
        assert_eq!(geocoder.reverse_calls().len(), 1);
    }

    #[tokio::test]
    async fn infer_zip4_without_extension_is_no_match() {
        let geocoder = MockGeocoder::new();
        geocoder.set_geocode_result(Ok(Coordinates {
            latitude: 38.8899,
            longitude: -77.0091,
        }));
        geocoder.set_reverse_result(Ok(ReverseAddress {
            street_address: String::new(),
            city: "Washington".into(),
            state: "DC".into(),
            zip5: "20004".into(),
            zip4: None,
        }));

        let result = infer_zip4(&geocoder, &AddressQuery::default()).await;
        assert!(matches!(result, Err(GeocodeError::NoMatch)));
    }
}
