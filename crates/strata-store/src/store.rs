#![forbid(unsafe_code)]

//! Store façade: construction, action dispatch, snapshots, subscriptions.
//!
//! # Architecture
//!
//! [`StoreBuilder`] separates the three kinds of configuration — initial
//! state, computed fields, actions — at the type level, so a malformed
//! entry cannot be silently miscomputed; recoverably malformed entries
//! (duplicate or empty names) are ignored with a warning at build time.
//!
//! [`Store::call`] is the only mutation path. It runs the action inside an
//! observed batch; after the outermost call frame completes — on success
//! and on error alike — an effective batch triggers exactly one reaction:
//! computed-field update, snapshot capture, broadcast. Actions receive an
//! explicit store handle so one action can call another; the nested call
//! batches into the outer frame and produces no extra notification.
//!
//! # Invariants
//!
//! 1. External readers only ever observe [`Snapshot`]s, never the live
//!    tree.
//! 2. Exactly one notification per outermost action call that performed at
//!    least one effective write.
//! 3. [`Store::version`] increments by exactly 1 per notification, and the
//!    broadcast snapshot carries that generation.
//! 4. State reflects whatever writes completed before an action error
//!    (best-effort consistency, no rollback) — and those writes are still
//!    reacted to and broadcast.
//!
//! # Example
//!
//! ```
//! use serde_json::{Value, json};
//! use strata_store::Store;
//!
//! # fn main() -> strata_store::Result<()> {
//! let store = Store::builder()
//!     .state(json!({ "count": 0 }))
//!     .computed("doubled", |state| json!(state["count"].as_i64().unwrap_or(0) * 2))
//!     .action("increment", |state, _store, _args| {
//!         state.update("count", |count| json!(count.as_i64().unwrap_or(0) + 1))?;
//!         Ok(Value::Null)
//!     })
//!     .build()?;
//!
//! store.call("increment", &[])?;
//! assert_eq!(store.get("count"), Some(json!(1)));
//! assert_eq!(store.get("doubled"), Some(json!(2)));
//! # Ok(())
//! # }
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use strata_value::Snapshot;

use crate::computed::{ComputeFn, ComputedEngine, ComputedSpec};
use crate::error::{Result, StoreError};
use crate::observe::{Observed, Observer};
use crate::subscribe::{SubscriberSet, Subscription};

/// A registered action body: tracked state, store handle for reentrant
/// calls, caller arguments.
pub type ActionFn = Rc<dyn Fn(&Observed, &Store, &[Value]) -> Result<Value>>;

/// Typed registration of initial state, computed fields, and actions.
pub struct StoreBuilder {
    state: Value,
    computed: Vec<(String, ComputeFn)>,
    actions: Vec<(String, ActionFn)>,
}

impl StoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Value::Object(Map::new()),
            computed: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Set the initial state tree. Must be an object; `build` fails
    /// otherwise.
    #[must_use]
    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    /// Set the initial state tree from any serializable value.
    pub fn try_state<T: Serialize>(mut self, state: &T) -> Result<Self> {
        self.state = serde_json::to_value(state)?;
        Ok(self)
    }

    /// Register a derived field. `compute` must be a pure function of the
    /// state it receives; its result is installed at `key` like an ordinary
    /// field.
    #[must_use]
    pub fn computed(
        mut self,
        key: impl Into<String>,
        compute: impl Fn(&Value) -> Value + 'static,
    ) -> Self {
        self.computed.push((key.into(), Box::new(compute)));
        self
    }

    /// Register a named action — the only way to mutate the store's state
    /// after construction.
    #[must_use]
    pub fn action(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&Observed, &Store, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.actions.push((name.into(), Rc::new(action)));
        self
    }

    /// Validate the configuration, install computed fields, and capture the
    /// initial snapshot. No notification is produced for the installs.
    pub fn build(self) -> Result<Store> {
        if !self.state.is_object() {
            return Err(StoreError::InvalidInitialState {
                found: value_kind(&self.state),
            });
        }

        let mut seen = AHashSet::new();
        let mut specs = Vec::with_capacity(self.computed.len());
        for (key, compute) in self.computed {
            if key.is_empty() {
                warn!("ignoring computed field with an empty name");
                continue;
            }
            if !seen.insert(key.clone()) {
                warn!(key = %key, "ignoring duplicate computed field");
                continue;
            }
            if self.state.get(&key).is_some() {
                warn!(key = %key, "computed field shadows an initial state field");
            }
            specs.push(ComputedSpec::new(key, compute));
        }

        let mut actions: AHashMap<String, ActionFn> = AHashMap::with_capacity(self.actions.len());
        for (name, action) in self.actions {
            if name.is_empty() {
                warn!("ignoring action with an empty name");
                continue;
            }
            if actions.contains_key(&name) {
                warn!(name = %name, "ignoring duplicate action");
                continue;
            }
            actions.insert(name, action);
        }

        let changed = Rc::new(Cell::new(false));
        let hook_flag = Rc::clone(&changed);
        let observer = Observer::wrap(self.state, move || hook_flag.set(true));
        observer.set_require_batch(true);

        let mut engine = ComputedEngine::new(specs);
        observer.batch(|| engine.initialize(&observer))?;
        // Installing computed fields is part of construction, not a change.
        changed.set(false);

        let snapshot = observer.with_raw(|raw| Snapshot::capture(raw, 0));

        Ok(Store {
            inner: Rc::new(StoreInner {
                observer,
                engine: RefCell::new(engine),
                actions,
                subscribers: SubscriberSet::new(),
                snapshot: RefCell::new(snapshot),
                version: Cell::new(0),
                changed,
            }),
        })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct StoreInner {
    observer: Observer,
    engine: RefCell<ComputedEngine>,
    actions: AHashMap<String, ActionFn>,
    subscribers: Rc<SubscriberSet>,
    snapshot: RefCell<Snapshot>,
    version: Cell<u64>,
    changed: Rc<Cell<bool>>,
}

/// The public composition point: actions in, snapshots out.
///
/// `Store` is a cheap-clone handle; clones share the same state tree,
/// actions, and subscribers.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Invoke a named action. The action's return value (or error) is
    /// forwarded unmodified. If the call frame performed at least one
    /// effective write, computed fields update, a new snapshot is captured,
    /// and every subscriber is notified — exactly once, however many writes
    /// or nested action calls occurred.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let action = self
            .inner
            .actions
            .get(name)
            .ok_or_else(|| StoreError::UnknownAction {
                name: name.to_owned(),
            })?
            .clone();

        let outermost = !self.inner.observer.in_batch();
        trace!(action = %name, outermost, "dispatching action");

        let result = self
            .inner
            .observer
            .batch(|| action(&self.inner.observer.root(), self, args));

        if outermost && self.inner.changed.take() {
            let reacted = self.react();
            match (&result, reacted) {
                (Ok(_), reacted) => reacted?,
                (Err(_), Err(react_err)) => {
                    // The action's own error wins; the reaction failure is
                    // still surfaced in the log.
                    warn!(action = %name, error = %react_err, "post-action update failed");
                }
                (Err(_), Ok(())) => {}
            }
        }
        result
    }

    /// The most recent snapshot. Never the live tree; cheap to clone and
    /// safe to hold or send across threads.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Direct field read from the most recent snapshot.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.snapshot.borrow().get(key).cloned()
    }

    /// Register a change listener; it receives every snapshot broadcast
    /// after this point, in registration order relative to other listeners.
    /// Keep the returned guard alive for as long as notifications are
    /// wanted.
    #[must_use]
    pub fn subscribe(&self, listener: impl Fn(&Snapshot) + 'static) -> Subscription {
        SubscriberSet::add(&self.inner.subscribers, Rc::new(listener))
    }

    /// Number of effective change batches broadcast so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.inner.actions.contains_key(name)
    }

    /// Registered action names, sorted for determinism.
    #[must_use]
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.actions.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Computed update → snapshot capture → broadcast, once per effective
    /// outermost call frame.
    fn react(&self) -> Result<()> {
        {
            let mut engine = self.inner.engine.borrow_mut();
            if !engine.is_empty() {
                self.inner
                    .observer
                    .batch(|| engine.update(&self.inner.observer))?;
            }
        }
        // Engine writes raised their own change event; it belongs to this
        // reaction, not to a future one.
        self.inner.changed.set(false);

        let generation = self.inner.version.get() + 1;
        self.inner.version.set(generation);
        let snapshot = self
            .inner
            .observer
            .with_raw(|raw| Snapshot::capture(raw, generation));
        *self.inner.snapshot.borrow_mut() = snapshot.clone();

        debug!(
            generation,
            subscribers = self.inner.subscribers.len(),
            "broadcasting snapshot"
        );
        self.inner.subscribers.notify(&snapshot);
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.inner.version.get())
            .field("actions", &self.inner.actions.len())
            .field("subscribers", &self.inner.subscribers.len())
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
