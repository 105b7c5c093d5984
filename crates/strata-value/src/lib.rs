#![forbid(unsafe_code)]

//! Value-tree primitives for the Strata state container.
//!
//! This crate holds the pieces of the state model that do not depend on the
//! store itself:
//!
//! - [`path`]: segment-based addressing into a nested [`Value`] tree.
//! - [`Fingerprint`]: a canonical, order-stable serialization of a tree,
//!   compared to decide whether derived fields need recomputation.
//! - [`Snapshot`]: a deep-copied, read-only, point-in-time view of a tree,
//!   safe to hand to code outside the store.
//!
//! The tree itself is a plain [`serde_json::Value`]: maps, arrays, and
//! primitives. Cyclic graphs cannot be expressed in this model, which is a
//! deliberate constraint of the store built on top.

pub mod error;
pub mod fingerprint;
pub mod path;
pub mod snapshot;

pub use error::{Result, ValueError};
pub use fingerprint::Fingerprint;
pub use path::Segment;
pub use snapshot::Snapshot;

pub use serde_json::Value;
