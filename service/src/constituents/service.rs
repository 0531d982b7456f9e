//! Service layer for constituent addresses
//!
//! Wraps the repository with the operations that call out to the district
//! pipeline and the geocoder, and owns the side effect of recording results.

use std::sync::Arc;

use uuid::Uuid;

use super::repo::{ConstituentRepo, ConstituentRepoError};
use super::types::{Address, AddressError, Constituent, NewAddress};
use crate::congress::{DistrictResolver, ResolutionFailure, ResolvedDistrict};
use crate::geocode::{infer_zip4, GeocodeError, Geocoder};

#[derive(Debug, thiserror::Error)]
pub enum ConstituentError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("district unresolved: {0}")]
    Unresolved(ResolutionFailure),
    #[error("zip+4 lookup failed: {0}")]
    Lookup(#[from] GeocodeError),
    #[error(transparent)]
    Repo(#[from] ConstituentRepoError),
}

pub struct ConstituentService {
    repo: Arc<dyn ConstituentRepo>,
    resolver: Arc<DistrictResolver>,
    geocoder: Arc<dyn Geocoder>,
}

impl ConstituentService {
    #[must_use]
    pub fn new(
        repo: Arc<dyn ConstituentRepo>,
        resolver: Arc<DistrictResolver>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            repo,
            resolver,
            geocoder,
        }
    }

    /// Create a constituent with a first address generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConstituentError::InvalidAddress`] before anything is written
    /// if the address does not validate.
    pub async fn register(
        &self,
        email: &str,
        address: NewAddress,
    ) -> Result<(Constituent, Address), ConstituentError> {
        let address = address.normalized()?;
        let (constituent, address) = self.repo.register(email, &address).await?;
        tracing::info!(constituent_id = %constituent.id, "constituent registered");
        Ok((constituent, address))
    }

    /// Resolve and record the district for the constituent's current address.
    ///
    /// A failed resolution is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`ConstituentError::Unresolved`] when the pipeline cannot
    /// determine a district.
    pub async fn resolve_district(
        &self,
        constituent_id: Uuid,
    ) -> Result<ResolvedDistrict, ConstituentError> {
        let address = self.repo.current_address(constituent_id).await?;

        let resolved = match self.resolver.resolve(&address).await {
            Ok(resolved) => resolved,
            Err(failure) => {
                tracing::info!(%constituent_id, %failure, "district resolution failed");
                return Err(ConstituentError::Unresolved(failure));
            }
        };

        self.repo.record_district(address.id, &resolved).await?;
        tracing::info!(
            %constituent_id,
            address_id = %address.id,
            district = %resolved.district,
            "district resolved"
        );
        Ok(resolved)
    }

    /// Append a new address generation. The district must be resolved again.
    ///
    /// # Errors
    ///
    /// Returns [`ConstituentError::InvalidAddress`] if the address does not validate.
    pub async fn change_address(
        &self,
        constituent_id: Uuid,
        address: NewAddress,
    ) -> Result<Address, ConstituentError> {
        let address = address.normalized()?;
        let created = self
            .repo
            .add_address_generation(constituent_id, &address)
            .await?;
        tracing::info!(
            %constituent_id,
            generation = created.generation,
            "address changed"
        );
        Ok(created)
    }

    /// Fill in a missing zip+4 on the current address through the geocoder.
    ///
    /// # Errors
    ///
    /// Returns [`ConstituentError::Lookup`] when the geocoder cannot supply one.
    pub async fn complete_address(&self, constituent_id: Uuid) -> Result<Address, ConstituentError> {
        let mut address = self.repo.current_address(constituent_id).await?;
        if address.zip4.is_some() {
            return Ok(address);
        }

        let zip4 = infer_zip4(self.geocoder.as_ref(), &address.query()).await?;
        self.repo.record_zip4(address.id, &zip4).await?;
        address.zip4 = Some(zip4);
        Ok(address)
    }

    #[must_use]
    pub fn repo(&self) -> &Arc<dyn ConstituentRepo> {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congress::mock::MockCongressClient;
    use crate::congress::{District, DistrictCandidate};
    use crate::constituents::mock::MockConstituentRepo;
    use crate::geocode::mock::MockGeocoder;
    use crate::geocode::{Coordinates, ReverseAddress};

    struct Harness {
        repo: Arc<MockConstituentRepo>,
        congress: Arc<MockCongressClient>,
        geocoder: Arc<MockGeocoder>,
        service: ConstituentService,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MockConstituentRepo::new());
        let congress = Arc::new(MockCongressClient::new());
        let geocoder = Arc::new(MockGeocoder::new());
        let resolver = Arc::new(DistrictResolver::new(congress.clone(), geocoder.clone()));
        let service = ConstituentService::new(repo.clone(), resolver, geocoder.clone());
        Harness {
            repo,
            congress,
            geocoder,
            service,
        }
    }

    fn new_address(zip5: &str) -> NewAddress {
        NewAddress {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            street_address: "2000 N 14th St".into(),
            city: "Arlington".into(),
            state: "Virginia".into(),
            zip5: zip5.into(),
            ..NewAddress::default()
        }
    }

    #[tokio::test]
    async fn resolve_district_records_on_current_generation() {
        let h = harness();
        let (constituent, address) = h
            .service
            .register("ada@example.com", new_address("22201"))
            .await
            .unwrap();
        h.congress.set_zip_result(Ok(vec![DistrictCandidate {
            state: "VA".into(),
            district: Some(8),
        }]));

        let resolved = h.service.resolve_district(constituent.id).await.unwrap();

        assert_eq!(resolved.district, District::new("VA", Some(8)));
        let stored = h.repo.get_address(address.id).await.unwrap();
        assert_eq!(stored.district, Some(District::new("VA", Some(8))));
    }

    #[tokio::test]
    async fn failed_resolution_writes_nothing() {
        let h = harness();
        let (constituent, address) = h
            .service
            .register("ada@example.com", new_address("22201"))
            .await
            .unwrap();
        h.congress.set_zip_result(Ok(vec![]));

        let err = h.service.resolve_district(constituent.id).await.unwrap_err();

        assert!(matches!(
            err,
            ConstituentError::Unresolved(ResolutionFailure::Undetermined)
        ));
        assert_eq!(h.repo.get_address(address.id).await.unwrap().district, None);
    }

    #[tokio::test]
    async fn change_address_appends_generation_and_clears_district() {
        let h = harness();
        let (constituent, first) = h
            .service
            .register("ada@example.com", new_address("22201"))
            .await
            .unwrap();
        h.congress.set_zip_result(Ok(vec![DistrictCandidate {
            state: "VA".into(),
            district: Some(8),
        }]));
        h.service.resolve_district(constituent.id).await.unwrap();

        let second = h
            .service
            .change_address(constituent.id, new_address("22030"))
            .await
            .unwrap();

        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(second.district, None);
        let generations = h.repo.generations(constituent.id);
        assert_eq!(generations.len(), 2);
        assert_eq!(generations[0].zip5, "22201");
        assert_eq!(
            h.repo.current_address(constituent.id).await.unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_before_writing() {
        let h = harness();
        let err = h
            .service
            .register("ada@example.com", new_address("2220"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConstituentError::InvalidAddress(AddressError::InvalidZip5)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_no_orphan_address() {
        let h = harness();
        let (constituent, _) = h
            .service
            .register("ada@example.com", new_address("22201"))
            .await
            .unwrap();

        let err = h
            .service
            .register("ADA@example.com", new_address("22030"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConstituentError::Repo(ConstituentRepoError::DuplicateEmail)
        ));
        let generations = h.repo.generations(constituent.id);
        assert_eq!(generations.len(), 1);
        assert_eq!(generations[0].zip5, "22201");
    }

    #[tokio::test]
    async fn complete_address_infers_zip4() {
        let h = harness();
        let (constituent, _) = h
            .service
            .register("ada@example.com", new_address("22201"))
            .await
            .unwrap();
        h.geocoder.set_geocode_result(Ok(Coordinates {
            latitude: 38.8893,
            longitude: -77.0846,
        }));
        h.geocoder.set_reverse_result(Ok(ReverseAddress {
            street_address: "2000 N 14th St".into(),
            city: "Arlington".into(),
            state: "VA".into(),
            zip5: "22201".into(),
            zip4: Some("2520".into()),
        }));

        let completed = h.service.complete_address(constituent.id).await.unwrap();

        assert_eq!(completed.zip4.as_deref(), Some("2520"));
        let stored = h.repo.current_address(constituent.id).await.unwrap();
        assert_eq!(stored.zip_plus_4(), "22201-2520");
    }
}
