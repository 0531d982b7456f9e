//! Address resolver.
//!
//! Turns structured postal addresses into coordinates and back through an
//! external geocoding service.
//!
//! - [`Geocoder`] - Trait defining the two lookups
//! - [`HttpGeocoder`] - Texas A&M geoservices implementation using reqwest
//! - [`mock::MockGeocoder`] - Mock for unit tests (behind `test-utils` feature)
//!
//! Retrying is a caller decision; the district pipeline treats a failed
//! geocode as terminal for that resolution attempt.

mod client;
mod types;

pub use client::{infer_zip4, GeocodeError, Geocoder, HttpGeocoder};
pub use types::{AddressQuery, Coordinates, ReverseAddress};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock;
