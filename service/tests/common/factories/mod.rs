//! Test data factories for reducing test setup boilerplate.
//!
//! # Usage
//!
//! ```rust
//! use common::factories::{AddressFactory, LegislatorFactory};
//!
//! let senator = LegislatorFactory::senator("VA").build();
//! let address = AddressFactory::new().in_state("VA").build();
//! ```

mod address;
mod legislator;

pub use address::AddressFactory;
pub use legislator::LegislatorFactory;

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique test data.
/// Each call to `next_id()` returns a unique value across all tests.
static FACTORY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a unique ID for generating test data.
/// Thread-safe and guaranteed unique within a test run.
pub fn next_id() -> u64 {
    FACTORY_COUNTER.fetch_add(1, Ordering::SeqCst)
}
