//! Constituents and their address generations.

mod repo;
mod service;
mod types;

pub use repo::{
    add_address_generation_with_conn, create_constituent, current_address, get_address,
    get_constituent, record_district, record_zip4, register_with_conn, ConstituentRepo,
    ConstituentRepoError, PgConstituentRepo,
};
pub use service::{ConstituentError, ConstituentService};
pub use types::{is_valid_zip5, Address, AddressError, Constituent, NewAddress, SenderProfile};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    pub use super::repo::mock::MockConstituentRepo;
}
