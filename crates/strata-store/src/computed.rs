#![forbid(unsafe_code)]

//! Memoized derived state fields.
//!
//! # Design
//!
//! Each `ComputedSpec` pairs a target key with a pure compute function
//! and caches `(last_fingerprint, last_value)`. After every observed write
//! batch the engine walks the specs in registration order: a spec
//! recomputes only when the canonical [`Fingerprint`] of the current raw
//! state differs from its cache, and writes the result back — an ordinary
//! observed write — only when the value actually changed. Suppressing the
//! unchanged write is what keeps recomputation from feeding itself.
//!
//! After a spec writes its own key the fingerprint cache is refreshed from
//! the post-write state, so the engine's own writes never force a
//! recompute on the next cycle. Because fingerprints cover the whole
//! state, a spec may read fields installed by earlier specs.
//!
//! # Invariants
//!
//! 1. A spec recomputes at most once per update cycle.
//! 2. A recompute that yields the cached value writes nothing.
//! 3. Installed fields are ordinary state fields, visible to actions,
//!    snapshots, and other specs alike.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: propagates to the action caller with all
//!   guards reset; fields written by earlier specs in the same cycle
//!   remain (no rollback).
//! - **Impure compute function**: not handled. Compute functions must be
//!   pure functions of the state they receive.

use serde_json::Value;
use tracing::trace;

use strata_value::Fingerprint;

use crate::error::Result;
use crate::observe::{Observed, Observer};

pub(crate) type ComputeFn = Box<dyn Fn(&Value) -> Value>;

/// A named derived field with its memoization caches.
pub(crate) struct ComputedSpec {
    key: String,
    compute: ComputeFn,
    last_fingerprint: Option<Fingerprint>,
    last_value: Option<Value>,
}

impl ComputedSpec {
    pub(crate) fn new(key: String, compute: ComputeFn) -> Self {
        Self {
            key,
            compute,
            last_fingerprint: None,
            last_value: None,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Recompute if the state fingerprint moved (or unconditionally when
    /// `force` is set), writing the result back only on a value change.
    /// Returns whether a write happened.
    fn refresh(&mut self, observer: &Observer, root: &Observed, force: bool) -> Result<bool> {
        let fingerprint = observer.with_raw(Fingerprint::of);
        if !force && self.last_fingerprint.as_ref() == Some(&fingerprint) {
            return Ok(false);
        }

        let value = observer.with_raw(|raw| (self.compute)(raw));
        if self.last_value.as_ref() == Some(&value) {
            // Unchanged result: remember the fingerprint so the next cycle
            // skips the recompute, write nothing.
            self.last_fingerprint = Some(fingerprint);
            return Ok(false);
        }

        root.set(self.key.as_str(), value.clone())?;
        // Fingerprint the post-write state so our own write does not count
        // as drift next cycle.
        self.last_fingerprint = Some(observer.with_raw(Fingerprint::of));
        self.last_value = Some(value);
        Ok(true)
    }
}

/// Ordered collection of computed specs, driven by the store façade.
pub(crate) struct ComputedEngine {
    specs: Vec<ComputedSpec>,
}

impl ComputedEngine {
    pub(crate) fn new(specs: Vec<ComputedSpec>) -> Self {
        Self { specs }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Run every spec once against the initial state and install the
    /// results as ordinary state fields.
    pub(crate) fn initialize(&mut self, observer: &Observer) -> Result<()> {
        let root = observer.root();
        for spec in &mut self.specs {
            spec.refresh(observer, &root, true)?;
        }
        Ok(())
    }

    /// Refresh every spec after an observed write batch.
    pub(crate) fn update(&mut self, observer: &Observer) -> Result<()> {
        let root = observer.root();
        for spec in &mut self.specs {
            if spec.refresh(observer, &root, false)? {
                trace!(key = %spec.key(), "computed field updated");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
