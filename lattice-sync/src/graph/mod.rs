//! Signal Graph
//!
//! This module implements the dataflow graph that keeps derived values in
//! sync with the values they are computed from.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are signals: variables written from outside, reactions computed
//!   from their parents, and effects that run a callback
//! - Edges point from a parent to every node computed from it
//!
//! Writes are grouped into batches of [`Change`]s. Draining a batch walks
//! the cached topological schedule once; every reaction with a changed
//! parent is recomputed at most once, after all of its parents, and only
//! joins the changed set if its new value differs from the old one. A value
//! that stops changing stops propagating.
//!
//! # Reentrancy
//!
//! A batch submitted while another is draining (for example by an effect
//! that writes a variable) is queued and drained afterwards by the same
//! caller. A reaction's own value is stored under a silent guard: batches
//! submitted to the same graph from the storing thread while the guard is
//! alive are dropped, so the store cannot feed back into the scheduler.
//! Other threads are unaffected and keep propagating their writes.
//!
//! # Teardown
//!
//! Every node belongs to a [`Lifetime`]. Terminating it removes the node,
//! its edges and its handler. Dependents of a removed node keep reading its
//! last value but are never woken by it again.

mod node;
mod scheduler;
mod signal;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::lifetime::{CallbackKey, Lifetime};

use node::{Cell, Node};
use scheduler::UpdateScheduler;

pub use node::{NodeKind, SignalId};
pub use signal::{Change, Signal, VariableSignal};

type DeriveFn<V> = Arc<dyn Fn(&[V]) -> V + Send + Sync>;
type EffectFn<V> = Arc<dyn Fn(&[V]) + Send + Sync>;

/// What a node runs when one of its parents changes.
enum Compute<V> {
    Derive(DeriveFn<V>),
    Effect(EffectFn<V>),
}

impl<V> Clone for Compute<V> {
    fn clone(&self) -> Self {
        match self {
            Compute::Derive(f) => Compute::Derive(Arc::clone(f)),
            Compute::Effect(f) => Compute::Effect(Arc::clone(f)),
        }
    }
}

thread_local! {
    /// Graphs whose reaction values this thread is storing right now.
    static SILENT_GRAPHS: RefCell<SmallVec<[usize; 4]>> = RefCell::new(SmallVec::new());
}

struct GraphState<V> {
    scheduler: UpdateScheduler<V>,
    handlers: HashMap<SignalId, Compute<V>>,
    /// Teardown callbacks to cancel when a node is removed by hand.
    registrations: HashMap<SignalId, (Lifetime, CallbackKey)>,
    pending: VecDeque<Vec<Change<V>>>,
    draining: bool,
}

pub(crate) struct GraphInner<V> {
    state: Mutex<GraphState<V>>,
}

impl<V> GraphInner<V> {
    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Whether the current thread is inside a silent write on this graph.
    fn is_silent(&self) -> bool {
        let address = self.address();
        SILENT_GRAPHS.with(|graphs| graphs.borrow().contains(&address))
    }
}

/// A handle to a signal graph. Clones share the same graph.
pub struct ReactGraph<V> {
    inner: Arc<GraphInner<V>>,
}

impl<V> ReactGraph<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GraphInner {
                state: Mutex::new(GraphState {
                    scheduler: UpdateScheduler::new(),
                    handlers: HashMap::new(),
                    registrations: HashMap::new(),
                    pending: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<GraphInner<V>>) -> Self {
        Self { inner }
    }

    /// Create a variable holding `initial`, owned by `lifetime`.
    pub fn variable(&self, lifetime: &Lifetime, initial: V) -> VariableSignal<V> {
        let cell = signal::cell(initial);
        let node = Node::new(NodeKind::Source, Some(Arc::clone(&cell)));
        let id = self.register(lifetime, node, None);
        VariableSignal::new(Signal::new(id, cell), Arc::downgrade(&self.inner))
    }

    /// Create a signal computed by `handler` from the values of `parents`.
    ///
    /// The handler receives the parent values in the order given here. It
    /// runs once immediately for the initial value, then again whenever a
    /// parent changes.
    pub fn reaction<F>(&self, lifetime: &Lifetime, parents: &[&Signal<V>], handler: F) -> Signal<V>
    where
        F: Fn(&[V]) -> V + Send + Sync + 'static,
    {
        let initial = handler(&read_all(parents));
        let cell = signal::cell(initial);
        let node = with_parents(Node::new(NodeKind::Derived, Some(Arc::clone(&cell))), parents);
        let id = self.register(lifetime, node, Some(Compute::Derive(Arc::new(handler))));
        Signal::new(id, cell)
    }

    /// Run `callback` with the values of `parents` now and whenever one of
    /// them changes, until `lifetime` ends.
    pub fn effect<F>(&self, lifetime: &Lifetime, parents: &[&Signal<V>], callback: F) -> SignalId
    where
        F: Fn(&[V]) + Send + Sync + 'static,
    {
        callback(&read_all(parents));
        let node = with_parents(Node::new(NodeKind::Effect, None), parents);
        self.register(lifetime, node, Some(Compute::Effect(Arc::new(callback))))
    }

    fn register(&self, lifetime: &Lifetime, node: Node<V>, compute: Option<Compute<V>>) -> SignalId {
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.scheduler.add_node(node);
            if let Some(compute) = compute {
                state.handlers.insert(id, compute);
            }
            id
        };
        tracing::trace!(signal = id.raw(), lifetime = lifetime.id(), "registered signal");

        let graph = Arc::downgrade(&self.inner);
        let key = lifetime.on_terminate(move || {
            if let Some(inner) = graph.upgrade() {
                ReactGraph::from_inner(inner).unregister(id);
            }
        });

        // A terminated lifetime has already removed the node.
        let mut state = self.inner.state.lock();
        if state.scheduler.contains(id) {
            state.registrations.insert(id, (lifetime.clone(), key));
        }
        id
    }

    /// Remove a node, its edges and its handler. Returns `false` if the node
    /// was already gone.
    ///
    /// Lifetimes call this on teardown; callers rarely need to.
    pub fn unregister(&self, id: SignalId) -> bool {
        let (removed, registration) = {
            let mut state = self.inner.state.lock();
            state.handlers.remove(&id);
            let registration = state.registrations.remove(&id);
            (state.scheduler.remove_node(id).is_some(), registration)
        };
        if let Some((lifetime, key)) = registration {
            lifetime.cancel(key);
        }
        if removed {
            tracing::trace!(signal = id.raw(), "unregistered signal");
        }
        removed
    }

    /// Write several variables and propagate them as a single batch.
    ///
    /// A reaction that depends on more than one of them recomputes once.
    pub fn apply_batch<'a, I>(&self, writes: I)
    where
        I: IntoIterator<Item = (&'a VariableSignal<V>, V)>,
    {
        let changes: Vec<Change<V>> = writes
            .into_iter()
            .map(|(variable, value)| Change {
                signal: variable.id(),
                old: variable.replace(value.clone()),
                new: value,
            })
            .collect();
        self.schedule_update(changes);
    }

    /// Queue a batch of changes and, unless a drain is already running,
    /// drain every queued batch before returning.
    ///
    /// The changes only name what moved; values are read from the signals
    /// themselves. Batches submitted by a thread that is inside a silent
    /// write on this graph are dropped.
    pub fn schedule_update(&self, batch: Vec<Change<V>>) {
        if self.inner.is_silent() {
            tracing::trace!(changes = batch.len(), "dropped batch submitted during a silent write");
            return;
        }

        {
            let mut state = self.inner.state.lock();
            state.pending.push_back(batch);
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let mut guard = DrainGuard {
            inner: &self.inner,
            finished: false,
        };
        loop {
            let next = {
                let mut state = self.inner.state.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.draining = false;
                }
                next
            };
            match next {
                Some(batch) => self.fire_updates(batch),
                None => break,
            }
        }
        guard.finished = true;
    }

    /// Propagate one batch through the schedule.
    fn fire_updates(&self, batch: Vec<Change<V>>) {
        let mut changed: HashSet<SignalId> = batch
            .iter()
            .filter(|change| change.is_effective())
            .map(|change| change.signal)
            .collect();
        if changed.is_empty() {
            return;
        }

        let schedule = self.inner.state.lock().scheduler.schedule();
        let mut recomputed = 0usize;

        for &id in schedule.iter() {
            // Snapshot what the node needs, then run its handler unlocked so
            // handlers may read signals or build new nodes.
            let (inputs, cell, compute) = {
                let state = self.inner.state.lock();
                let Some(node) = state.scheduler.get_node(id) else {
                    continue;
                };
                if node.kind() == NodeKind::Source || !node.depends_on_any(&changed) {
                    continue;
                }
                let Some(compute) = state.handlers.get(&id).cloned() else {
                    continue;
                };
                let inputs: SmallVec<[Cell<V>; 4]> = node
                    .dependencies()
                    .iter()
                    .map(|(_, cell)| Arc::clone(cell))
                    .collect();
                (inputs, node.cell().cloned(), compute)
            };
            let values: Vec<V> = inputs.iter().map(|cell| cell.read().clone()).collect();
            recomputed += 1;

            match compute {
                Compute::Derive(handler) => {
                    let value = handler(&values);
                    let Some(cell) = cell else {
                        continue;
                    };
                    let _silent = SilentWrite::enter(&*self.inner);
                    let mut slot = cell.write();
                    if *slot != value {
                        *slot = value;
                        changed.insert(id);
                    }
                }
                Compute::Effect(callback) => callback(&values),
            }
        }

        tracing::trace!(changed = changed.len(), recomputed, "drained batch");
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.state.lock().scheduler.node_count()
    }

    pub fn contains(&self, id: SignalId) -> bool {
        self.inner.state.lock().scheduler.contains(id)
    }

    /// The current propagation order.
    pub fn schedule(&self) -> Vec<SignalId> {
        self.inner.state.lock().scheduler.schedule().to_vec()
    }
}

impl<V> Clone for ReactGraph<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for ReactGraph<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ReactGraph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ReactGraph")
            .field("nodes", &state.scheduler.node_count())
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}

fn read_all<V: Clone>(signals: &[&Signal<V>]) -> Vec<V> {
    signals.iter().map(|signal| signal.get()).collect()
}

fn with_parents<V>(mut node: Node<V>, parents: &[&Signal<V>]) -> Node<V> {
    for parent in parents {
        node.add_dependency(parent.id, Arc::clone(&parent.cell));
    }
    node
}

/// Guard marking a reaction's own value store on the current thread.
///
/// Batches the same thread submits to the same graph while the guard is
/// alive are dropped. The mark is removed on drop, so a panic cannot leave
/// the thread silenced.
struct SilentWrite {
    address: usize,
}

impl SilentWrite {
    fn enter<V>(inner: &GraphInner<V>) -> Self {
        let address = inner.address();
        SILENT_GRAPHS.with(|graphs| graphs.borrow_mut().push(address));
        Self { address }
    }
}

impl Drop for SilentWrite {
    fn drop(&mut self) {
        SILENT_GRAPHS.with(|graphs| {
            let mut graphs = graphs.borrow_mut();
            if let Some(pos) = graphs.iter().rposition(|&address| address == self.address) {
                graphs.remove(pos);
            }
        });
    }
}

/// Clears the draining flag if a handler panics mid-drain.
struct DrainGuard<'a, V> {
    inner: &'a GraphInner<V>,
    finished: bool,
}

impl<V> Drop for DrainGuard<'_, V> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.inner.state.lock();
            state.draining = false;
            state.pending.clear();
        }
    }
}
