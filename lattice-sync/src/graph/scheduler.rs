//! Update Scheduler
//!
//! The scheduler owns the graph's nodes and edges and keeps a cached
//! topological schedule: a total order over every node in which each node
//! comes after all of its parents.
//!
//! # Algorithm
//!
//! The schedule is the reverse post-order of a depth-first traversal over the
//! forward (parent to child) edges, started from every node in insertion
//! order. It is dropped whenever a node is added or removed and rebuilt on
//! the next request, so registration stays cheap and propagation never
//! re-sorts.
//!
//! Edges only ever point from an existing node to a newly registered one, so
//! the graph cannot contain a cycle.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::node::{Node, SignalId};

/// Node storage plus the cached propagation order.
pub(crate) struct UpdateScheduler<V> {
    /// All nodes in the graph, indexed by ID, in registration order.
    nodes: IndexMap<SignalId, Node<V>>,

    /// Cached topological order; `None` when stale.
    schedule: Option<Arc<[SignalId]>>,
}

impl<V> UpdateScheduler<V> {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            schedule: None,
        }
    }

    /// Add a node to the graph, wiring an edge from each of its dependencies.
    pub fn add_node(&mut self, node: Node<V>) -> SignalId {
        let id = node.id();
        for (parent, _) in node.dependencies() {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.add_dependent(id);
            }
        }
        self.nodes.insert(id, node);
        self.schedule = None;
        id
    }

    /// Remove a node from the graph.
    ///
    /// Edges from its parents are removed. Its dependents keep reading the
    /// node's last value but are no longer woken by it.
    pub fn remove_node(&mut self, id: SignalId) -> Option<Node<V>> {
        let node = self.nodes.shift_remove(&id)?;
        for (parent, _) in node.dependencies() {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.remove_dependent(id);
            }
        }
        self.schedule = None;
        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: SignalId) -> Option<&Node<V>> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: SignalId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The propagation order, rebuilt if a node was added or removed since
    /// the last call.
    pub fn schedule(&mut self) -> Arc<[SignalId]> {
        if let Some(schedule) = &self.schedule {
            return Arc::clone(schedule);
        }
        let schedule: Arc<[SignalId]> = self.topological_order().into();
        self.schedule = Some(Arc::clone(&schedule));
        schedule
    }

    /// Reverse post-order DFS over forward edges.
    fn topological_order(&self) -> Vec<SignalId> {
        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut postorder = Vec::with_capacity(self.nodes.len());
        // (node, index of the next dependent to visit)
        let mut stack: Vec<(SignalId, usize)> = Vec::new();

        for &root in self.nodes.keys() {
            if !visited.insert(root) {
                continue;
            }
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let id = top.0;
                let child = self
                    .nodes
                    .get(&id)
                    .and_then(|node| node.dependents().get_index(top.1))
                    .copied();
                match child {
                    Some(child) => {
                        top.1 += 1;
                        if visited.insert(child) {
                            stack.push((child, 0));
                        }
                    }
                    None => {
                        postorder.push(id);
                        stack.pop();
                    }
                }
            }
        }

        postorder.reverse();
        postorder
    }
}

impl<V> Default for UpdateScheduler<V> {
    fn default() -> Self {
        Self::new()
    }
}
