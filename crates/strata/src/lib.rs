#![forbid(unsafe_code)]

//! Strata public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use strata_store::{
    Observed, Observer, Result, Store, StoreBuilder, StoreError, Subscription,
};
pub use strata_value::{Fingerprint, Snapshot, Value, ValueError};

pub mod prelude {
    pub use strata_store as store;
    pub use strata_value as value;
}
