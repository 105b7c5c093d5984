#![forbid(unsafe_code)]

//! Mutation observing for the state tree.
//!
//! # Design
//!
//! [`Observer`] owns the raw tree in `Rc<RefCell<..>>` single-threaded
//! shared storage. [`Observed`] handles address a node by path and resolve
//! it from the root on every operation — handles are stateless and may be
//! re-derived at any time, so holding one across arbitrary mutations is
//! safe (operations on a vanished node fail, they never alias).
//!
//! Every mutation entry point compares the old value against the new one
//! and only marks the batch dirty on an effective change. Batching is a
//! depth counter managed by an RAII guard: writes inside
//! [`Observer::batch`] accumulate into a single dirty flag, and the change
//! hook fires exactly once when the outermost batch ends dirty. Writes
//! outside any batch fire the hook immediately, one event per write.
//!
//! # Invariants
//!
//! 1. Exactly one change event per outermost batch that performed at least
//!    one effective write, regardless of nesting depth or how many writes
//!    occurred (array operations included — they ride the same guard, there
//!    is no method special-casing).
//! 2. Writing a value equal to the current one never produces an event.
//! 3. The depth counter always returns to its pre-batch value, on early
//!    `?` return and on unwind alike (the guard resets in `Drop`).
//!
//! # Failure Modes
//!
//! - **Closure panics inside `batch`**: the guard resets, but the hook is
//!   not invoked mid-unwind. Effective writes made before the panic stay in
//!   the tree with the dirty flag set, and fold into the next batch's
//!   event.
//! - **Handle escapes its batch** (store mode, `require_batch`): mutating
//!   an [`Observed`] while no batch is in progress fails with
//!   [`StoreError::MutationOutsideAction`] before touching the tree.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use strata_value::ValueError;
use strata_value::path::{self, Segment};

use crate::error::{Result, StoreError};

type ChangeHook = Box<dyn Fn()>;

struct ObserverShared {
    root: RefCell<Value>,
    depth: Cell<u32>,
    dirty: Cell<bool>,
    require_batch: Cell<bool>,
    hook: Option<ChangeHook>,
}

impl ObserverShared {
    fn fire_hook(&self) {
        trace!("change event");
        if let Some(hook) = &self.hook {
            hook();
        }
    }

    fn mark_changed(&self) {
        if self.depth.get() == 0 {
            // No call in progress: notify immediately, per write.
            self.fire_hook();
        } else {
            self.dirty.set(true);
        }
    }
}

/// Owns a raw state tree and makes writes anywhere in it observable.
pub struct Observer {
    shared: Rc<ObserverShared>,
}

impl Observer {
    /// Wrap `root` without a change hook. Batching and dirty tracking still
    /// apply; [`Observer::is_dirty`] is the only signal.
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self::build(root, None)
    }

    /// Wrap `root`; `on_change` fires once per effective change batch (or
    /// per effective write outside a batch).
    #[must_use]
    pub fn wrap(root: Value, on_change: impl Fn() + 'static) -> Self {
        Self::build(root, Some(Box::new(on_change)))
    }

    fn build(root: Value, hook: Option<ChangeHook>) -> Self {
        Self {
            shared: Rc::new(ObserverShared {
                root: RefCell::new(root),
                depth: Cell::new(0),
                dirty: Cell::new(false),
                require_batch: Cell::new(false),
                hook,
            }),
        }
    }

    /// Handle addressing the root of the tree.
    #[must_use]
    pub fn root(&self) -> Observed {
        Observed {
            shared: Rc::clone(&self.shared),
            path: Vec::new(),
        }
    }

    /// Run `f` inside a batched call frame. Writes made while the frame is
    /// open coalesce into at most one change event, fired when the
    /// outermost frame closes. Frames nest; errors and panics from `f`
    /// propagate with the frame correctly closed.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter(Rc::clone(&self.shared));
        f()
    }

    /// Current batch nesting depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.shared.depth.get()
    }

    /// Whether a batched call frame is currently open.
    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.depth() > 0
    }

    /// Whether an effective write is pending in the open batch.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.get()
    }

    /// Store mode: reject mutations while no batch is open instead of
    /// firing immediately.
    pub(crate) fn set_require_batch(&self, on: bool) {
        self.shared.require_batch.set(on);
    }

    /// Escape accessor to the raw unwrapped tree, for fingerprinting and
    /// snapshotting. Deliberately crate-private: external code only ever
    /// sees snapshots.
    pub(crate) fn with_raw<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.shared.root.borrow())
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("depth", &self.shared.depth.get())
            .field("dirty", &self.shared.dirty.get())
            .finish_non_exhaustive()
    }
}

/// RAII reentrancy guard for one batched call frame.
struct BatchGuard {
    shared: Rc<ObserverShared>,
}

impl BatchGuard {
    fn enter(shared: Rc<ObserverShared>) -> Self {
        shared.depth.set(shared.depth.get() + 1);
        Self { shared }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = self.shared.depth.get().saturating_sub(1);
        self.shared.depth.set(depth);
        // During unwind the dirty flag is left set so the pending change is
        // not lost; it folds into the next batch.
        if depth == 0 && !std::thread::panicking() && self.shared.dirty.replace(false) {
            self.shared.fire_hook();
        }
    }
}

/// A path-scoped handle onto the observed tree.
///
/// Reads resolve the path lazily; mutations compare old vs. new and mark
/// the open batch dirty only on effective change.
#[derive(Clone)]
pub struct Observed {
    shared: Rc<ObserverShared>,
    path: Vec<Segment>,
}

impl Observed {
    /// Child handle under a map key. No validation happens here; operations
    /// on the child fail if the path does not resolve.
    #[must_use]
    pub fn at(&self, key: impl Into<String>) -> Observed {
        let mut path = self.path.clone();
        path.push(Segment::Key(key.into()));
        Observed {
            shared: Rc::clone(&self.shared),
            path,
        }
    }

    /// Child handle under an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> Observed {
        let mut path = self.path.clone();
        path.push(Segment::Index(index));
        Observed {
            shared: Rc::clone(&self.shared),
            path,
        }
    }

    /// Diagnostic rendering of this handle's path, e.g. `$.todos[0]`.
    #[must_use]
    pub fn path(&self) -> String {
        path::render(&self.path)
    }

    // ── reads ───────────────────────────────────────────────────────────

    /// Clone the addressed node, or `None` if the path no longer resolves.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.with(Value::clone)
    }

    /// Borrow the addressed node without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> Option<R> {
        let root = self.shared.root.borrow();
        path::lookup(&root, &self.path).map(f)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.with(Value::as_i64).flatten()
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.with(Value::as_f64).flatten()
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.with(Value::as_bool).flatten()
    }

    #[must_use]
    pub fn as_str(&self) -> Option<String> {
        self.with(|v| v.as_str().map(str::to_owned)).flatten()
    }

    /// Element/entry count of an array or object node.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        self.with(|v| match v {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        })
        .flatten()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len().is_none_or(|len| len == 0)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.with(|v| v.get(key).is_some()).unwrap_or(false)
    }

    // ── writes ──────────────────────────────────────────────────────────

    /// Insert or replace `key` on this object node. Writing a value equal
    /// to the current one is a no-op.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.guard_write()?;
        let key = key.into();
        let value = value.into();
        let changed = {
            let mut root = self.shared.root.borrow_mut();
            let map = self.object_mut(&mut root)?;
            if map.get(&key) == Some(&value) {
                false
            } else {
                map.insert(key, value);
                true
            }
        };
        if changed {
            self.shared.mark_changed();
        }
        Ok(())
    }

    /// Read-modify-write an existing key on this object node. Fails with
    /// [`ValueError::Missing`] if the key is absent. `f` must not touch the
    /// store.
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> Result<()> {
        self.guard_write()?;
        let changed = {
            let mut root = self.shared.root.borrow_mut();
            let map = self.object_mut(&mut root)?;
            let current = map
                .get(key)
                .ok_or_else(|| ValueError::missing(&self.child_path(key)))?;
            let next = f(current);
            if *current == next {
                false
            } else {
                map.insert(key.to_owned(), next);
                true
            }
        };
        if changed {
            self.shared.mark_changed();
        }
        Ok(())
    }

    /// Remove `key` from this object node, returning the previous value.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.guard_write()?;
        let removed = {
            let mut root = self.shared.root.borrow_mut();
            let map = self.object_mut(&mut root)?;
            map.remove(key)
        };
        if removed.is_some() {
            self.shared.mark_changed();
        }
        Ok(removed)
    }

    /// Replace the element at `index` of this array node.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.guard_write()?;
        let value = value.into();
        let changed = {
            let mut root = self.shared.root.borrow_mut();
            let items = self.array_mut(&mut root)?;
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| ValueError::index_out_of_bounds(&self.path, index, len))?;
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            self.shared.mark_changed();
        }
        Ok(())
    }

    /// Append to this array node.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.guard_write()?;
        {
            let mut root = self.shared.root.borrow_mut();
            let items = self.array_mut(&mut root)?;
            items.push(value.into());
        }
        self.shared.mark_changed();
        Ok(())
    }

    /// Remove and return the last element of this array node.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.guard_write()?;
        let popped = {
            let mut root = self.shared.root.borrow_mut();
            let items = self.array_mut(&mut root)?;
            items.pop()
        };
        if popped.is_some() {
            self.shared.mark_changed();
        }
        Ok(popped)
    }

    /// Insert into this array node at `index` (which may equal the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.guard_write()?;
        {
            let mut root = self.shared.root.borrow_mut();
            let items = self.array_mut(&mut root)?;
            if index > items.len() {
                return Err(
                    ValueError::index_out_of_bounds(&self.path, index, items.len()).into(),
                );
            }
            items.insert(index, value.into());
        }
        self.shared.mark_changed();
        Ok(())
    }

    /// Remove and return the element at `index` of this array node.
    pub fn remove_index(&self, index: usize) -> Result<Value> {
        self.guard_write()?;
        let removed = {
            let mut root = self.shared.root.borrow_mut();
            let items = self.array_mut(&mut root)?;
            if index >= items.len() {
                return Err(
                    ValueError::index_out_of_bounds(&self.path, index, items.len()).into(),
                );
            }
            items.remove(index)
        };
        self.shared.mark_changed();
        Ok(removed)
    }

    /// Empty this array or object node.
    pub fn clear(&self) -> Result<()> {
        self.guard_write()?;
        let changed = {
            let mut root = self.shared.root.borrow_mut();
            let node = self.node_mut(&mut root)?;
            match node {
                Value::Array(items) if !items.is_empty() => {
                    items.clear();
                    true
                }
                Value::Object(map) if !map.is_empty() => {
                    map.clear();
                    true
                }
                Value::Array(_) | Value::Object(_) => false,
                _ => return Err(ValueError::not_an_object(&self.path).into()),
            }
        };
        if changed {
            self.shared.mark_changed();
        }
        Ok(())
    }

    // ── internals ───────────────────────────────────────────────────────

    fn guard_write(&self) -> Result<()> {
        if self.shared.require_batch.get() && self.shared.depth.get() == 0 {
            return Err(StoreError::MutationOutsideAction);
        }
        Ok(())
    }

    fn child_path(&self, key: &str) -> Vec<Segment> {
        let mut path = self.path.clone();
        path.push(Segment::Key(key.to_owned()));
        path
    }

    fn node_mut<'v>(&self, root: &'v mut Value) -> Result<&'v mut Value> {
        path::lookup_mut(root, &self.path)
            .ok_or_else(|| ValueError::missing(&self.path).into())
    }

    fn object_mut<'v>(
        &self,
        root: &'v mut Value,
    ) -> Result<&'v mut serde_json::Map<String, Value>> {
        self.node_mut(root)?
            .as_object_mut()
            .ok_or_else(|| ValueError::not_an_object(&self.path).into())
    }

    fn array_mut<'v>(&self, root: &'v mut Value) -> Result<&'v mut Vec<Value>> {
        self.node_mut(root)?
            .as_array_mut()
            .ok_or_else(|| ValueError::not_an_array(&self.path).into())
    }
}

impl std::fmt::Debug for Observed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observed").field("path", &self.path()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn counting_observer(root: Value) -> (Observer, Rc<Cell<u32>>) {
        let events = Rc::new(Cell::new(0u32));
        let hook_events = Rc::clone(&events);
        let observer = Observer::wrap(root, move || {
            hook_events.set(hook_events.get() + 1);
        });
        (observer, events)
    }

    #[test]
    fn write_outside_batch_fires_immediately() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        observer.root().set("a", 2).unwrap();
        assert_eq!(events.get(), 1);
        observer.root().set("a", 3).unwrap();
        assert_eq!(events.get(), 2);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        observer.root().set("a", 1).unwrap();
        assert_eq!(events.get(), 0);
        assert!(!observer.is_dirty());
    }

    #[test]
    fn batch_coalesces_writes() {
        let (observer, events) = counting_observer(json!({ "a": 1, "b": 2 }));
        observer.batch(|| {
            let root = observer.root();
            root.set("a", 10).unwrap();
            root.set("b", 20).unwrap();
            root.set("c", 30).unwrap();
        });
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn clean_batch_fires_nothing() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        observer.batch(|| {
            observer.root().set("a", 1).unwrap();
        });
        assert_eq!(events.get(), 0);
    }

    #[test]
    fn nested_batches_fire_once_at_outermost() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        observer.batch(|| {
            observer.root().set("a", 2).unwrap();
            observer.batch(|| {
                observer.root().set("a", 3).unwrap();
            });
            assert_eq!(events.get(), 0);
        });
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn array_operations_coalesce_via_guard() {
        let (observer, events) = counting_observer(json!({ "items": [] }));
        observer.batch(|| {
            let items = observer.root().at("items");
            items.push(1).unwrap();
            items.push(2).unwrap();
            items.push(3).unwrap();
            items.remove_index(0).unwrap();
        });
        assert_eq!(events.get(), 1);
        assert_eq!(observer.root().at("items").get(), Some(json!([2, 3])));
    }

    #[test]
    fn error_return_still_closes_frame() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        let result: Result<()> = observer.batch(|| {
            observer.root().set("a", 2)?;
            Err(StoreError::action("boom"))
        });
        assert!(result.is_err());
        assert_eq!(observer.depth(), 0);
        // The effective write before the error still produced its event.
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn panic_resets_guard_and_keeps_change_pending() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        let root = observer.root();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observer.batch(|| {
                root.set("a", 2).unwrap();
                panic!("action blew up");
            })
        }));
        assert!(panicked.is_err());
        assert_eq!(observer.depth(), 0);
        // No event mid-unwind, but the change is not lost.
        assert_eq!(events.get(), 0);
        assert!(observer.is_dirty());
        observer.batch(|| {});
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn nested_handles_track_subtrees() {
        let (observer, events) = counting_observer(json!({ "k": { "v": { "k": { "v": 1 } } } }));
        let leaf = observer.root().at("k").at("v").at("k");
        assert_eq!(leaf.at("v").as_i64(), Some(1));
        leaf.set("v", 2).unwrap();
        assert_eq!(events.get(), 1);
        assert_eq!(observer.root().at("k").at("v").at("k").at("v").as_i64(), Some(2));
    }

    #[test]
    fn stale_handle_fails_instead_of_aliasing() {
        let (observer, _) = counting_observer(json!({ "items": [{ "x": 1 }] }));
        let first = observer.root().at("items").index(0);
        observer.root().at("items").pop().unwrap();
        assert!(first.get().is_none());
        assert!(matches!(
            first.set("x", 2),
            Err(StoreError::Value(ValueError::Missing { .. }))
        ));
    }

    #[test]
    fn type_mismatches_are_reported() {
        let (observer, _) = counting_observer(json!({ "n": 1, "items": [] }));
        assert!(matches!(
            observer.root().at("n").push(1),
            Err(StoreError::Value(ValueError::NotAnArray { .. }))
        ));
        assert!(matches!(
            observer.root().at("items").set("k", 1),
            Err(StoreError::Value(ValueError::NotAnObject { .. }))
        ));
        assert!(matches!(
            observer.root().at("items").set_index(5, 1),
            Err(StoreError::Value(ValueError::IndexOutOfBounds { .. }))
        ));
    }

    #[test]
    fn require_batch_rejects_outside_writes() {
        let (observer, events) = counting_observer(json!({ "a": 1 }));
        observer.set_require_batch(true);
        let root = observer.root();
        assert!(matches!(
            root.set("a", 2),
            Err(StoreError::MutationOutsideAction)
        ));
        assert_eq!(events.get(), 0);
        // Inside a batch the same handle works.
        observer.batch(|| root.set("a", 2)).unwrap();
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn remove_and_pop_only_mark_when_effective() {
        let (observer, events) = counting_observer(json!({ "a": 1, "items": [] }));
        assert_eq!(observer.root().remove("missing").unwrap(), None);
        assert_eq!(observer.root().at("items").pop().unwrap(), None);
        assert_eq!(events.get(), 0);
        assert_eq!(observer.root().remove("a").unwrap(), Some(json!(1)));
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn update_requires_existing_key() {
        let (observer, events) = counting_observer(json!({ "count": 4 }));
        observer
            .root()
            .update("count", |v| json!(v.as_i64().unwrap_or(0) + 1))
            .unwrap();
        assert_eq!(observer.root().at("count").as_i64(), Some(5));
        assert_eq!(events.get(), 1);
        assert!(matches!(
            observer.root().update("missing", |v| v.clone()),
            Err(StoreError::Value(ValueError::Missing { .. }))
        ));
    }

    #[test]
    fn clear_handles_both_composites() {
        let (observer, events) = counting_observer(json!({ "items": [1], "map": { "a": 1 } }));
        observer.root().at("items").clear().unwrap();
        observer.root().at("map").clear().unwrap();
        assert_eq!(events.get(), 2);
        // Clearing an already-empty node is not a change.
        observer.root().at("items").clear().unwrap();
        assert_eq!(events.get(), 2);
    }
}
