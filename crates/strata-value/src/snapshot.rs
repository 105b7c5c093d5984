#![forbid(unsafe_code)]

//! Immutable point-in-time copies of a state tree.
//!
//! # Design
//!
//! A [`Snapshot`] deep-copies the raw tree once per effective change batch
//! and shares the copy by reference (`Arc` clone) with every reader — the
//! store's `getState`, every subscriber, and any thread the embedder ships
//! it to. Immutability is type-level: the snapshot only ever hands out
//! `&Value`, so there is no write surface to reject at runtime.
//!
//! # Invariants
//!
//! 1. A snapshot never observes mutations made to the source tree after
//!    capture.
//! 2. Copies produced by [`to_value`](Snapshot::to_value) are independent:
//!    mutating one cannot affect the snapshot, the source tree, or any other
//!    copy.
//! 3. Capture is O(size of tree) and happens at most once per change batch,
//!    never once per subscriber.
//!
//! Input trees must be acyclic; `serde_json::Value` cannot express a cycle,
//! so this holds by construction.

use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// An independent, recursively read-only copy of a state tree.
///
/// Cloning a `Snapshot` is cheap and shares the underlying copy.
#[derive(Debug, Clone)]
pub struct Snapshot {
    value: Arc<Value>,
    generation: u64,
}

impl Snapshot {
    /// Deep-copy `raw` into a new snapshot stamped with `generation`.
    #[must_use]
    pub fn capture(raw: &Value, generation: u64) -> Self {
        Self {
            value: Arc::new(raw.clone()),
            generation,
        }
    }

    /// An empty-object snapshot, generation 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: Arc::new(Value::Object(Map::new())),
            generation: 0,
        }
    }

    /// The change-batch generation this snapshot was produced under.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Borrow the underlying tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Produce an independent owned copy of the tree. Mutating the copy
    /// cannot affect this snapshot or the store it came from.
    #[must_use]
    pub fn to_value(&self) -> Value {
        (*self.value).clone()
    }

    /// Deserialize the whole snapshot into a typed view.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.as_value())
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for Snapshot {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

/// Equality compares tree contents only; the generation stamp is metadata.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Snapshot {}
