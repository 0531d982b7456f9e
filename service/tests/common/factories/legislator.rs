//! Legislator factory for directory fixtures.

use super::next_id;
use emailcongress_api::congress::{Chamber, Legislator};
use uuid::Uuid;

/// Builder for legislators with a unique bioguide id and a routable address.
///
/// ```rust
/// let rep = LegislatorFactory::representative("VA", 8).build();
/// let senator = LegislatorFactory::senator("VA").uncontactable().build();
/// ```
pub struct LegislatorFactory {
    bioguide_id: Option<String>,
    chamber: Chamber,
    state: String,
    district: Option<i32>,
    contactable: bool,
}

impl LegislatorFactory {
    #[must_use]
    pub fn representative(state: &str, district: i32) -> Self {
        Self {
            bioguide_id: None,
            chamber: Chamber::House,
            state: state.to_string(),
            district: Some(district),
            contactable: true,
        }
    }

    /// A delegate or at-large member, elected state-wide to the House.
    #[must_use]
    pub fn at_large(state: &str) -> Self {
        Self {
            district: None,
            ..Self::representative(state, 0)
        }
    }

    #[must_use]
    pub fn senator(state: &str) -> Self {
        Self {
            bioguide_id: None,
            chamber: Chamber::Senate,
            state: state.to_string(),
            district: None,
            contactable: true,
        }
    }

    #[must_use]
    pub fn with_bioguide(mut self, bioguide_id: &str) -> Self {
        self.bioguide_id = Some(bioguide_id.to_string());
        self
    }

    #[must_use]
    pub const fn uncontactable(mut self) -> Self {
        self.contactable = false;
        self
    }

    #[must_use]
    pub fn build(self) -> Legislator {
        let bioguide_id = self
            .bioguide_id
            .unwrap_or_else(|| format!("T{:06}", next_id()));
        let title = match self.chamber {
            Chamber::House => "Rep",
            Chamber::Senate => "Sen",
        };
        Legislator {
            id: Uuid::new_v4(),
            email: format!("{}@opencongress.org", bioguide_id.to_lowercase()),
            first_name: "Test".to_string(),
            last_name: bioguide_id.clone(),
            bioguide_id,
            chamber: self.chamber,
            state: self.state,
            district: self.district,
            title: title.to_string(),
            contactable: self.contactable,
        }
    }
}
