//! Signal Handles
//!
//! Handles are what callers hold on to. A [`Signal`] reads a node's current
//! value; a [`VariableSignal`] can also write it. Both share the node's value
//! cell, so reading never touches the graph lock and keeps working after the
//! node has been torn down.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::node::{Cell, SignalId};
use super::{GraphInner, ReactGraph};

/// A read-only handle to a value in the graph.
pub struct Signal<V> {
    pub(super) id: SignalId,
    pub(super) cell: Cell<V>,
}

impl<V> Signal<V> {
    pub(super) fn new(id: SignalId, cell: Cell<V>) -> Self {
        Self { id, cell }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.cell.read())
    }
}

impl<V: Clone> Signal<V> {
    /// Get the current value.
    pub fn get(&self) -> V {
        self.cell.read().clone()
    }
}

impl<V> Clone for Signal<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Signal<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.cell.read())
            .finish()
    }
}

/// A signal written from outside the graph.
///
/// Each [`set`](Self::set) is its own propagation batch. Use
/// [`ReactGraph::apply_batch`] to write several variables as one.
pub struct VariableSignal<V> {
    signal: Signal<V>,
    graph: Weak<GraphInner<V>>,
}

impl<V> VariableSignal<V> {
    pub(super) fn new(signal: Signal<V>, graph: Weak<GraphInner<V>>) -> Self {
        Self { signal, graph }
    }

    pub fn id(&self) -> SignalId {
        self.signal.id
    }

    /// The read-only view of this variable, for use as a reaction parent.
    pub fn signal(&self) -> &Signal<V> {
        &self.signal
    }

    /// Store `value` and return the previous one, without propagating.
    pub(super) fn replace(&self, value: V) -> V {
        std::mem::replace(&mut *self.signal.cell.write(), value)
    }
}

impl<V> VariableSignal<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn get(&self) -> V {
        self.signal.get()
    }

    /// Write a new value and propagate it to dependents.
    ///
    /// Writing an equal value stores it but wakes nothing.
    pub fn set(&self, value: V) {
        let old = self.replace(value.clone());
        let change = Change {
            signal: self.id(),
            old,
            new: value,
        };
        if let Some(inner) = self.graph.upgrade() {
            ReactGraph::from_inner(inner).schedule_update(vec![change]);
        }
    }

    /// Write `f(current)`.
    pub fn update(&self, f: impl FnOnce(&V) -> V) {
        let next = self.signal.with(f);
        self.set(next);
    }
}

impl<V> Clone for VariableSignal<V> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            graph: Weak::clone(&self.graph),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for VariableSignal<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VariableSignal").field(&self.signal).finish()
    }
}

/// One value change fed into the graph.
///
/// A change whose `old` and `new` compare equal is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<V> {
    pub signal: SignalId,
    pub old: V,
    pub new: V,
}

impl<V: PartialEq> Change<V> {
    pub fn is_effective(&self) -> bool {
        self.old != self.new
    }
}

pub(super) fn cell<V>(value: V) -> Cell<V> {
    Arc::new(RwLock::new(value))
}
