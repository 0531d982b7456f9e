//! Data types for geocoding requests and Texas A&M geoservices responses.

use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;
use utoipa::ToSchema;

/// A usable latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Geocoders report misses as `0,0` or garbage; neither is a real address.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Structured address fields sent to the geocoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip5: String,
}

/// Address returned by a reverse geocode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseAddress {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip5: String,
    pub zip4: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GeocodeResponse {
    #[serde(default)]
    pub output_geocodes: Vec<OutputGeocodeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OutputGeocodeEntry {
    pub output_geocode: OutputGeocode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OutputGeocode {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub latitude: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ReverseGeocodeResponse {
    #[serde(default)]
    pub street_addresses: Vec<StreetAddressEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StreetAddressEntry {
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub zip_plus4: Option<String>,
}
