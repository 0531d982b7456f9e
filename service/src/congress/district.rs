//! District resolution pipeline.
//!
//! Ordered fallback, first success wins:
//!
//! 1. zip5 lookup; exactly one candidate is accepted as-is
//! 2. with zero or several candidates and a full street address, geocode
//!    the address (reusing stored coordinates) and look the point up
//! 3. anything else is [`ResolutionFailure::Undetermined`]
//!
//! Nothing here retries and nothing here writes; persisting the result is
//! the caller's job (see `ConstituentService::resolve_district`).

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::client::CongressApiClient;
use super::types::{District, DistrictCandidate};
use crate::constituents::{is_valid_zip5, Address};
use crate::geocode::{Coordinates, Geocoder};
use crate::states;

/// A district the pipeline is willing to stand behind.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResolvedDistrict {
    pub district: District,
    /// Normalized USPS code of the resolved state
    pub state: String,
    /// Coordinates used for a coordinate lookup, if one happened
    pub coordinates: Option<Coordinates>,
}

/// Why a district could not be resolved. The user fixes these by
/// correcting their address; they are never fatal to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailure {
    #[error("district could not be determined from the address")]
    Undetermined,
    #[error("zip code must be exactly five digits")]
    InvalidZip,
}

pub struct DistrictResolver {
    congress: Arc<dyn CongressApiClient>,
    geocoder: Arc<dyn Geocoder>,
}

impl DistrictResolver {
    #[must_use]
    pub fn new(congress: Arc<dyn CongressApiClient>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { congress, geocoder }
    }

    /// Resolve the congressional district for an address.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionFailure`] when no single district can be determined.
    pub async fn resolve(&self, address: &Address) -> Result<ResolvedDistrict, ResolutionFailure> {
        if !is_valid_zip5(&address.zip5) {
            return Err(ResolutionFailure::InvalidZip);
        }

        match self.congress.locate_districts_by_zip(&address.zip5).await {
            Ok(candidates) if candidates.len() == 1 => {
                if let Some(resolved) = candidates.into_iter().next().and_then(|c| accept(c, None)) {
                    return Ok(resolved);
                }
            }
            Ok(candidates) => {
                tracing::debug!(
                    zip5 = %address.zip5,
                    candidates = candidates.len(),
                    "zip lookup ambiguous"
                );
            }
            Err(e) => {
                tracing::warn!(zip5 = %address.zip5, error = %e, "zip district lookup failed");
            }
        }

        if !address.has_street_address() {
            return Err(ResolutionFailure::Undetermined);
        }

        let coordinates = match address.coordinates.filter(Coordinates::is_usable) {
            Some(stored) => stored,
            None => match self.geocoder.geocode(&address.query()).await {
                Ok(found) if found.is_usable() => found,
                Ok(found) => {
                    tracing::warn!(coordinates = ?found, "geocoder returned unusable coordinates");
                    return Err(ResolutionFailure::Undetermined);
                }
                Err(e) => {
                    tracing::warn!(address_id = %address.id, error = %e, "geocode failed");
                    return Err(ResolutionFailure::Undetermined);
                }
            },
        };

        match self
            .congress
            .locate_districts_by_coordinates(coordinates)
            .await
        {
            Ok(candidates) => candidates
                .into_iter()
                .next()
                .and_then(|best| accept(best, Some(coordinates)))
                .ok_or(ResolutionFailure::Undetermined),
            Err(e) => {
                tracing::warn!(?coordinates, error = %e, "coordinate district lookup failed");
                Err(ResolutionFailure::Undetermined)
            }
        }
    }
}

/// `None` for a candidate whose state is not a USPS state.
fn accept(
    candidate: DistrictCandidate,
    coordinates: Option<Coordinates>,
) -> Option<ResolvedDistrict> {
    let Some(state) = states::normalize(&candidate.state) else {
        tracing::warn!(state = %candidate.state, "district lookup returned an unknown state");
        return None;
    };
    Some(ResolvedDistrict {
        district: District::new(state, candidate.district),
        state: state.to_string(),
        coordinates,
    })
}
