//! Form-filling adapter.
//!
//! - [`FormFillClient`] - Trait for the discovery and submission calls
//! - [`HttpFormFillClient`] - reqwest implementation
//! - [`mock::MockFormFillClient`] - Scriptable mock (behind `test-utils` feature)
//! - [`resolve_fields`] - Maps sender data onto a legislator's form

mod client;
mod fields;
mod types;

pub use client::{FormFillClient, FormFillError, HttpFormFillClient};
pub use fields::{
    base_fields, resolve_fields, OptionChoice, OptionStrategy, ResolvedForm, ADDRESS_CITY,
    ADDRESS_STREET, ADDRESS_STREET_2, ADDRESS_ZIP4, ADDRESS_ZIP5, ADDRESS_ZIP_PLUS_4, EMAIL,
    MESSAGE, NAME_FIRST, NAME_FULL, NAME_LAST, NAME_PREFIX, PHONE, STATE_ABBREV, STATE_FULL,
    SUBJECT,
};
pub use types::{
    FormOption, FormSchema, FormSubmission, OptionSet, RequiredAction, SubmitOutcome, SubmitStatus,
};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock;
