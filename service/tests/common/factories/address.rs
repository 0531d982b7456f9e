//! Address factory for constituent registration.

use super::next_id;
use emailcongress_api::constituents::NewAddress;

/// Builder for a complete, valid address.
pub struct AddressFactory {
    address: NewAddress,
}

impl AddressFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: NewAddress {
                prefix: "Ms.".to_string(),
                first_name: "Pat".to_string(),
                last_name: "Doe".to_string(),
                street_address: format!("{} Wilson Blvd", next_id()),
                city: "Arlington".to_string(),
                state: "VA".to_string(),
                zip5: "22201".to_string(),
                phone: "703-555-0100".to_string(),
                ..NewAddress::default()
            },
        }
    }

    #[must_use]
    pub fn in_state(mut self, state: &str) -> Self {
        self.address.state = state.to_string();
        self
    }

    #[must_use]
    pub fn with_zip5(mut self, zip5: &str) -> Self {
        self.address.zip5 = zip5.to_string();
        self
    }

    #[must_use]
    pub fn without_street(mut self) -> Self {
        self.address.street_address = String::new();
        self
    }

    #[must_use]
    pub fn build(self) -> NewAddress {
        self.address
    }
}
