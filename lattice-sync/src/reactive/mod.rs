//! Reactive Models
//!
//! This module ties the model tree to the signal graph.
//!
//! # Concepts
//!
//! ## Transactions
//!
//! A [`ReactiveModel`] owns the root of a tree and changes it only through
//! queued transactions. Each transaction yields at most one root diff, which
//! is handed to the model's diff consumer after local subscribers have seen
//! it. A transport relays those diffs to mirror models, which replay them
//! with [`ReactiveModel::perform_transaction`].
//!
//! ## Subscriptions
//!
//! [`ReactiveModel::subscribe`] returns a graph signal tracking the node at a
//! path. Reactions and effects built on top of it recompute when a
//! transaction touches that path.
//!
//! ## Hosting
//!
//! [`ReactiveModel::host`] grafts lifetime-scoped subtrees onto the tree
//! through an [`Initializer`]; see the `host` module docs.

mod host;
mod model;

pub use host::Initializer;
pub use model::{ActionHandler, DiffConsumer, ReactiveModel};
