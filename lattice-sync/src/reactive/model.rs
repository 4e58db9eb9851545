//! Reactive Model
//!
//! [`ReactiveModel`] owns one model tree and is the only way to change it.
//!
//! # Transactions
//!
//! A transaction is a function from the current root to the next one.
//! Transactions are queued; whoever finds the queue idle drains it, so a
//! transaction submitted from inside a subscriber, an effect or the diff
//! consumer runs after the current one finishes instead of interleaving with
//! it. For every transaction the order of events is fixed:
//!
//! 1. the new root is diffed against the old one
//! 2. the root is replaced; a root that differs only in metadata (a new
//!    lifetime, host marker or tags) is still stored, but steps 3 and 4 are
//!    skipped
//! 3. subscriptions whose path the diff touches are written as one graph batch
//! 4. the diff consumer receives the diff
//!
//! A transaction that fails leaves the root untouched and skips steps 2-4.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::graph::{ReactGraph, Signal, SignalId, VariableSignal};
use crate::lifetime::{CallbackKey, Lifetime};
use crate::model::{Diff, MapDiff, MapModel, Model};
use crate::path::Path;

use super::host::Initializer;

/// Receives every non-empty root diff, in transaction order.
pub type DiffConsumer = Arc<dyn Fn(&MapDiff) + Send + Sync>;

/// Handles a dispatched command's `args`.
pub type ActionHandler = Arc<dyn Fn(&MapModel) + Send + Sync>;

type Transaction = Box<dyn FnOnce(Model) -> Result<Model> + Send>;
type Subscriptions = IndexMap<SignalId, Subscription>;

#[derive(Clone)]
struct Subscription {
    path: Path,
    variable: VariableSignal<Option<Model>>,
    lifetime: Lifetime,
    teardown: CallbackKey,
}

struct RegisteredHandler {
    id: u64,
    handler: ActionHandler,
    lifetime: Lifetime,
    teardown: CallbackKey,
}

/// Counter for telling apart successive handlers registered under one name.
static HANDLER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

struct TransactionQueue {
    pending: VecDeque<Transaction>,
    draining: bool,
}

/// The transactional owner of a model tree.
pub struct ReactiveModel {
    lifetime: Lifetime,
    root: RwLock<MapModel>,
    graph: ReactGraph<Option<Model>>,
    queue: Mutex<TransactionQueue>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    handlers: Arc<DashMap<String, RegisteredHandler>>,
    diff_consumer: RwLock<Option<DiffConsumer>>,
    hosting: AtomicBool,
}

impl ReactiveModel {
    /// Create a model with an empty root owned by `lifetime`.
    ///
    /// The root map's metadata carries `lifetime`, which is where hosted
    /// subtrees derive their own lifetimes from.
    pub fn new(lifetime: Lifetime) -> Self {
        Self {
            root: RwLock::new(MapModel::with_lifetime(lifetime.clone())),
            lifetime,
            graph: ReactGraph::new(),
            queue: Mutex::new(TransactionQueue {
                pending: VecDeque::new(),
                draining: false,
            }),
            subscriptions: Arc::new(Mutex::new(IndexMap::new())),
            handlers: Arc::new(DashMap::new()),
            diff_consumer: RwLock::new(None),
            hosting: AtomicBool::new(false),
        }
    }

    /// Use `graph` for subscriptions instead of a private graph, so they can
    /// feed reactions shared with other models.
    pub fn with_graph(mut self, graph: ReactGraph<Option<Model>>) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_diff_consumer<F>(self, consumer: F) -> Self
    where
        F: Fn(&MapDiff) + Send + Sync + 'static,
    {
        self.set_diff_consumer(consumer);
        self
    }

    /// Replace the diff consumer.
    pub fn set_diff_consumer<F>(&self, consumer: F)
    where
        F: Fn(&MapDiff) + Send + Sync + 'static,
    {
        *self.diff_consumer.write() = Some(Arc::new(consumer));
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn graph(&self) -> &ReactGraph<Option<Model>> {
        &self.graph
    }

    /// The current root.
    pub fn root(&self) -> MapModel {
        self.root.read().clone()
    }

    /// The node at `path` in the current root.
    pub fn get(&self, path: &Path) -> Option<Model> {
        let root = Model::Map(self.root());
        path.get_in(&root).cloned()
    }

    /// Queue `f` and drain the queue unless another call is draining it.
    ///
    /// Returns the first error among the transactions this call drained.
    pub fn transaction<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(Model) -> Model + Send + 'static,
    {
        self.try_transaction(move |root| Ok(f(root)))
    }

    /// Like [`transaction`](Self::transaction), for a function that can fail.
    /// A failing function aborts only its own transaction.
    pub fn try_transaction<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(Model) -> Result<Model> + Send + 'static,
    {
        {
            let mut queue = self.queue.lock();
            queue.pending.push_back(Box::new(f));
            if queue.draining {
                tracing::trace!(queued = queue.pending.len(), "transaction queued behind running drain");
                return Ok(());
            }
            queue.draining = true;
        }

        let mut guard = QueueGuard {
            queue: &self.queue,
            finished: false,
        };
        let mut first_error = None;
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let next = queue.pending.pop_front();
                if next.is_none() {
                    queue.draining = false;
                }
                next
            };
            let Some(transaction) = next else {
                break;
            };

            match self.perform_transaction(transaction) {
                Ok(Some(diff)) => self.emit(&diff),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(error = %err, "transaction aborted");
                    first_error.get_or_insert(err);
                }
            }
        }
        guard.finished = true;

        first_error.map_or(Ok(()), Err)
    }

    /// Apply `f` to the root right away, bypassing the queue and the diff
    /// consumer.
    ///
    /// Returns the root diff, or `None` if `f` changed nothing but metadata.
    /// This is the
    /// entry point for replaying diffs received from another model; local
    /// writers should use [`transaction`](Self::transaction).
    pub fn perform_transaction<F>(&self, f: F) -> Result<Option<MapDiff>>
    where
        F: FnOnce(Model) -> Result<Model>,
    {
        let old = Model::Map(self.root());
        let new = f(old.clone())?;

        let diff = match old.diff(&new) {
            None => None,
            Some(Diff::Map(diff)) => Some(diff),
            Some(other) => {
                tracing::error!(diff = other.kind(), root = new.kind(), "transaction replaced the root");
                return Err(Error::RootNotMap);
            }
        };
        let Model::Map(mut root) = new else {
            return Err(Error::RootNotMap);
        };
        if root.meta().lifetime.is_none() {
            root.meta_mut().lifetime = Some(self.lifetime.clone());
        }

        *self.root.write() = root.clone();
        let Some(diff) = diff else {
            // Metadata is invisible to equality; keep it without waking anyone.
            tracing::trace!("transaction changed nothing but metadata");
            return Ok(None);
        };
        tracing::trace!(changed = diff.changed.len(), removed = diff.removed.len(), "root replaced");

        let root = Model::Map(root);
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().values().cloned().collect();
        let woken: Vec<_> = subscriptions
            .iter()
            .filter(|sub| sub.path.touches_map(&diff))
            .map(|sub| (&sub.variable, sub.path.get_in(&root).cloned()))
            .collect();
        if !woken.is_empty() {
            self.graph.apply_batch(woken);
        }

        Ok(Some(diff))
    }

    fn emit(&self, diff: &MapDiff) {
        let consumer = self.diff_consumer.read().clone();
        if let Some(consumer) = consumer {
            consumer(diff);
        }
    }

    /// A signal holding the node at `path`, kept current until `lifetime`
    /// ends.
    pub fn subscribe(&self, lifetime: &Lifetime, path: Path) -> Signal<Option<Model>> {
        let current = self.get(&path);
        let variable = self.graph.variable(lifetime, current);
        let id = variable.id();
        let signal = variable.signal().clone();
        tracing::debug!(path = %path, signal = id.raw(), "subscribed");

        let subscriptions = Arc::downgrade(&self.subscriptions);
        let teardown = lifetime.on_terminate(move || {
            if let Some(subscriptions) = subscriptions.upgrade() {
                subscriptions.lock().shift_remove(&id);
            }
        });
        self.subscriptions.lock().insert(
            id,
            Subscription {
                path,
                variable,
                lifetime: lifetime.clone(),
                teardown,
            },
        );
        // The teardown may have run before the entry existed.
        if lifetime.is_terminated() {
            self.subscriptions.lock().shift_remove(&id);
        }
        signal
    }

    /// End a subscription before its lifetime does. Returns `false` if it
    /// had already ended.
    pub fn unsubscribe(&self, id: SignalId) -> bool {
        let Some(sub) = self.subscriptions.lock().shift_remove(&id) else {
            return false;
        };
        sub.lifetime.cancel(sub.teardown);
        self.graph.unregister(id);
        tracing::debug!(path = %sub.path, signal = id.raw(), "unsubscribed");
        true
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Register `handler` for commands named `name` until `lifetime` ends.
    ///
    /// A later registration under the same name replaces this one; ending
    /// this lifetime then leaves the newer handler alone.
    pub fn register_handler<F>(&self, lifetime: &Lifetime, name: impl Into<String>, handler: F)
    where
        F: Fn(&MapModel) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = HANDLER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(action = %name, "registered action handler");

        let handlers = Arc::downgrade(&self.handlers);
        let teardown = {
            let name = name.clone();
            lifetime.on_terminate(move || {
                if let Some(handlers) = handlers.upgrade() {
                    handlers.remove_if(&name, |_, registered| registered.id == id);
                }
            })
        };

        let registered = RegisteredHandler {
            id,
            handler: Arc::new(handler),
            lifetime: lifetime.clone(),
            teardown,
        };
        // The replaced handler no longer needs its teardown.
        if let Some(replaced) = self.handlers.insert(name.clone(), registered) {
            replaced.lifetime.cancel(replaced.teardown);
        }
        // The teardown may have run before the entry existed.
        if lifetime.is_terminated() {
            self.handlers.remove_if(&name, |_, registered| registered.id == id);
        }
    }

    /// Number of registered action handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Route a command to its handler.
    ///
    /// A command is a map with a string `action` and a map `args`. Unknown
    /// actions and malformed commands are logged and dropped. Returns whether
    /// a handler ran.
    pub fn dispatch(&self, command: &Model) -> bool {
        let Some(command) = command.as_map() else {
            tracing::warn!(kind = command.kind(), "dropping command that is not a map");
            return false;
        };
        let Some(action) = command.field("action").and_then(Model::as_str) else {
            tracing::warn!("dropping command without an action name");
            return false;
        };
        let Some(args) = command.field("args").and_then(Model::as_map) else {
            tracing::warn!(action, "dropping command without args");
            return false;
        };

        // Clone out of the map so the handler may register or remove handlers.
        let handler = self.handlers.get(action).map(|entry| Arc::clone(&entry.handler));
        match handler {
            Some(handler) => {
                tracing::trace!(action, "dispatching command");
                handler(args);
                true
            }
            None => {
                tracing::warn!(action, "no handler registered; dropping command");
                false
            }
        }
    }

    /// Host a subtree at `path`; see [`Initializer::host`].
    ///
    /// Fails with [`Error::HostInProgress`] if called from inside another
    /// build on this model; nested hosts go through the initializer passed
    /// to the builder.
    pub fn host<F>(&self, path: &Path, tags: &[&str], builder: F) -> Result<Lifetime>
    where
        F: FnOnce(&Path, &Lifetime, &mut Initializer<'_>) -> Result<()>,
    {
        if self.hosting.swap(true, Ordering::AcqRel) {
            return Err(Error::HostInProgress);
        }
        let _hosting = HostingFlag(&self.hosting);
        Initializer::new(self).host(path, tags, builder)
    }
}

impl fmt::Debug for ReactiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveModel")
            .field("lifetime", &self.lifetime)
            .field("root", &*self.root.read())
            .field("subscriptions", &self.subscription_count())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Clears the draining flag if a transaction panics mid-drain.
struct QueueGuard<'a> {
    queue: &'a Mutex<TransactionQueue>,
    finished: bool,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut queue = self.queue.lock();
            queue.draining = false;
            queue.pending.clear();
        }
    }
}

struct HostingFlag<'a>(&'a AtomicBool);

impl Drop for HostingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
