//! Graph Nodes
//!
//! This module defines the node types that live in the signal graph.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

/// Shared storage for a signal's current value.
///
/// The graph node and every handle to the signal point at the same cell, so
/// a handle keeps reading the last value even after its node is torn down.
pub(crate) type Cell<V> = Arc<RwLock<V>>;

/// Unique identifier for a signal in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    /// Generate a new unique signal ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the signal graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A variable signal. Written from outside the graph, never recomputed.
    Source,

    /// A derived signal. Recomputed from its parents by a pure handler.
    Derived,

    /// An effect. Runs a callback when its parents change and holds no value.
    Effect,
}

/// A node in the signal graph.
pub(crate) struct Node<V> {
    /// Unique identifier for this node.
    id: SignalId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current value; `None` for effects.
    cell: Option<Cell<V>>,

    /// Parents in handler argument order, with the cells they are read from.
    ///
    /// A parent that is torn down keeps its cell here, so the handler still
    /// sees its last value.
    dependencies: SmallVec<[(SignalId, Cell<V>); 4]>,

    /// Nodes recomputed when this one changes.
    dependents: IndexSet<SignalId>,
}

impl<V> Node<V> {
    pub fn new(kind: NodeKind, cell: Option<Cell<V>>) -> Self {
        Self {
            id: SignalId::new(),
            kind,
            cell,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn cell(&self) -> Option<&Cell<V>> {
        self.cell.as_ref()
    }

    /// Add a parent. Its cell is read each time this node recomputes.
    pub fn add_dependency(&mut self, id: SignalId, cell: Cell<V>) {
        self.dependencies.push((id, cell));
    }

    pub fn dependencies(&self) -> &[(SignalId, Cell<V>)] {
        &self.dependencies
    }

    pub fn depends_on_any(&self, ids: &HashSet<SignalId>) -> bool {
        self.dependencies.iter().any(|(id, _)| ids.contains(id))
    }

    pub fn add_dependent(&mut self, id: SignalId) {
        self.dependents.insert(id);
    }

    pub fn remove_dependent(&mut self, id: SignalId) {
        self.dependents.shift_remove(&id);
    }

    pub fn dependents(&self) -> &IndexSet<SignalId> {
        &self.dependents
    }
}
