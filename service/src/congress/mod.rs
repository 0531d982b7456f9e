//! Legislators, districts and recipient routing.
//!
//! # Architecture
//!
//! The external district lookup service sits behind a trait for testability:
//!
//! - [`CongressApiClient`] - Trait defining the zip and coordinate lookups
//! - [`HttpCongressClient`] - Real HTTP implementation using reqwest
//! - [`mock::MockCongressClient`] - Mock for unit tests (behind `test-utils` feature)
//!
//! On top of it:
//!
//! - [`DistrictResolver`] turns an address into a [`District`]
//! - [`LegislatorRepo`] reads the roster
//! - [`bucket_recipients`] sorts a message's recipients against the
//!   sender's permitted legislators
//!
//! # Testing Patterns
//!
//! ## Unit Tests (Mock Implementation)
//!
//! ```ignore
//! use emailcongress_api::congress::mock::MockCongressClient;
//!
//! let mock = MockCongressClient::new();
//! mock.set_zip_result(Ok(vec![DistrictCandidate { state: "VA".into(), district: Some(8) }]));
//!
//! let resolver = DistrictResolver::new(Arc::new(mock), geocoder);
//! ```
//!
//! ## Integration Tests (HTTP Stubbing)
//!
//! ```ignore
//! use crate::common::http_mock::MockHttpServer;
//!
//! let server = MockHttpServer::start().await;
//! server
//!     .expect_get("/districts/locate")
//!     .with_header("X-API-Key", "test-key")
//!     .respond_with_json(json!({ "results": [{ "state": "VA", "district": 8 }] }))
//!     .mount()
//!     .await;
//!
//! let client = HttpCongressClient::new(server.url(), "test-key");
//! let candidates = client.locate_districts_by_zip("22201").await.unwrap();
//! ```

mod buckets;
mod client;
mod district;
mod repo;
mod types;

pub use buckets::{bucket_recipients, EmailRouting, MatchedRecipient, RecipientBuckets};
pub use client::{CongressApiClient, CongressApiError, HttpCongressClient};
pub use district::{DistrictResolver, ResolutionFailure, ResolvedDistrict};
pub use repo::{
    find_legislators_by_emails, legislators_for_district, LegislatorRepo, LegislatorRepoError,
    PgLegislatorRepo,
};
pub use types::{Chamber, District, DistrictCandidate, DistrictsResponse, Legislator};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    pub use super::client::mock::MockCongressClient;
    pub use super::repo::mock::MockLegislatorRepo;
}
