//! Constituent and address-generation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::congress::District;
use crate::geocode::{AddressQuery, Coordinates};
use crate::states;

/// A person who writes to their legislators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Constituent {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// One generation of a constituent's postal address.
///
/// Rows are never edited in place except to record a resolved district or
/// inferred zip+4; changing the address appends a new generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub constituent_id: Uuid,
    pub generation: i32,
    pub prefix: String,
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    pub street_address2: String,
    pub city: String,
    /// Two-letter USPS code
    pub state: String,
    pub zip5: String,
    pub zip4: Option<String>,
    pub phone: String,
    pub coordinates: Option<Coordinates>,
    /// Not authoritative until resolved
    pub district: Option<District>,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Street, city and state are all present.
    #[must_use]
    pub fn has_street_address(&self) -> bool {
        !self.street_address.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.state.trim().is_empty()
    }

    #[must_use]
    pub fn query(&self) -> AddressQuery {
        AddressQuery {
            street_address: self.street_address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip5: self.zip5.clone(),
        }
    }

    /// `12345-6789`, or just the zip5 when no extension is known.
    #[must_use]
    pub fn zip_plus_4(&self) -> String {
        match &self.zip4 {
            Some(zip4) => format!("{}-{zip4}", self.zip5),
            None => self.zip5.clone(),
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Address fields as submitted by the constituent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewAddress {
    #[serde(default)]
    pub prefix: String,
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    #[serde(default)]
    pub street_address2: String,
    pub city: String,
    /// Code or full name; normalized to the USPS code
    pub state: String,
    pub zip5: String,
    #[serde(default)]
    pub zip4: Option<String>,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("zip code must be exactly five digits")]
    InvalidZip5,
    #[error("zip+4 extension must be exactly four digits")]
    InvalidZip4,
    #[error("unknown state '{0}'")]
    UnknownState(String),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Exactly five ASCII digits.
#[must_use]
pub fn is_valid_zip5(zip5: &str) -> bool {
    zip5.len() == 5 && zip5.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_zip4(zip4: &str) -> bool {
    zip4.len() == 4 && zip4.bytes().all(|b| b.is_ascii_digit())
}

impl NewAddress {
    /// Trim fields, normalize the state and check zip formats.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] for the first field that fails validation.
    pub fn normalized(mut self) -> Result<Self, AddressError> {
        for (name, value) in [
            ("first_name", &mut self.first_name),
            ("last_name", &mut self.last_name),
            ("city", &mut self.city),
        ] {
            *value = value.trim().to_string();
            if value.is_empty() {
                return Err(AddressError::Missing(name));
            }
        }
        self.street_address = self.street_address.trim().to_string();
        self.street_address2 = self.street_address2.trim().to_string();

        self.state = states::normalize(&self.state)
            .ok_or_else(|| AddressError::UnknownState(self.state.clone()))?
            .to_string();

        self.zip5 = self.zip5.trim().to_string();
        if !is_valid_zip5(&self.zip5) {
            return Err(AddressError::InvalidZip5);
        }

        self.zip4 = match self.zip4.take().map(|z| z.trim().to_string()) {
            Some(z) if z.is_empty() => None,
            Some(z) if is_valid_zip4(&z) => Some(z),
            Some(_) => return Err(AddressError::InvalidZip4),
            None => None,
        };
        Ok(self)
    }
}

/// Everything the form-filling step knows about a sender.
#[derive(Debug, Clone)]
pub struct SenderProfile {
    pub constituent: Constituent,
    pub address: Address,
}
