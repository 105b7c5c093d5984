#![forbid(unsafe_code)]

//! Action-driven reactive state store.
//!
//! This crate provides a minimal in-memory state container: a mutable
//! state tree that can only be changed through declared action functions,
//! automatically recomputes derived fields, and exposes change
//! notifications plus immutable read-only snapshots to interested
//! listeners.
//!
//! - [`Observer`] / [`Observed`]: a change-tracking wrapper around a
//!   nested value tree that detects writes anywhere in the graph and
//!   batches all writes of one top-level call into a single change event.
//! - [`computed`]: lazily-recomputed, memoized derived fields installed as
//!   ordinary state fields.
//! - [`Store`]: the public façade — binds actions, drives the
//!   recomputation/snapshot/broadcast pipeline, rejects external writes.
//! - [`Subscription`]: RAII guard for a change listener.
//!
//! # Architecture
//!
//! State lives in `Rc<RefCell<..>>` single-threaded shared storage.
//! Execution is synchronous; the only permitted nesting is an action
//! calling another action on the same call stack, which the observer's
//! reentrancy guard folds into the outer batch. Embedders that need
//! cross-thread access ship [`Snapshot`]s, which are plain shared data.
//!
//! # Invariants
//!
//! 1. External readers only ever observe [`Snapshot`]s, never the live
//!    state tree.
//! 2. Exactly one notification per top-level action call that performed at
//!    least one effective write.
//! 3. A computed field recomputes only when the state fingerprint moved,
//!    and writing an unchanged computed value never re-triggers
//!    notification.
//! 4. Snapshots are immutable and independent of the live tree.
//! 5. State trees are acyclic (`serde_json::Value` cannot express a
//!    cycle).

pub mod computed;
pub mod error;
pub mod observe;
pub mod store;
pub mod subscribe;

pub use error::{Result, StoreError};
pub use observe::{Observed, Observer};
pub use store::{ActionFn, Store, StoreBuilder};
pub use subscribe::Subscription;

pub use strata_value::{Fingerprint, Snapshot, Value, ValueError};
