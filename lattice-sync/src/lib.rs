//! Lattice Sync
//!
//! This crate provides a reactive state-synchronization engine. It
//! implements:
//!
//! - An immutable model tree with structural diff and patch
//! - Path addressing into models and diffs
//! - A signal graph that recomputes derived values in dependency order
//! - A transactional model owner that feeds subscribers and a diff consumer
//! - A host builder that grafts lifetime-scoped subtrees atomically
//!
//! The crate picks no wire format and ships no transport. Models and diffs
//! implement `serde` traits so a transport can encode them however it likes.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `model`: the tree value and its diffs
//! - `path`: addressing into trees
//! - `lifetime`: teardown scopes
//! - `graph`: signals, reactions and the update scheduler
//! - `reactive`: the transactional model and the host builder
//!
//! # Example
//!
//! ```rust
//! use lattice_sync::{path, Lifetime, Model, ReactiveModel};
//!
//! let lifetime = Lifetime::new();
//! let model = ReactiveModel::new(lifetime.clone());
//!
//! // Watch a path
//! let title = model.subscribe(&lifetime, path!["panel", "title"]);
//!
//! // Derive from it
//! let length = model.graph().reaction(&lifetime, &[&title], |v| {
//!     let len = v[0].as_ref().and_then(Model::as_str).map_or(0, str::len);
//!     Some(Model::from(len as i64))
//! });
//!
//! // Change the tree
//! model
//!     .transaction(|root| path!["panel", "title"].put_in(root, "Build"))
//!     .unwrap();
//!
//! assert_eq!(title.get(), Some(Model::from("Build")));
//! assert_eq!(length.get(), Some(Model::from(5)));
//! ```

pub mod error;
pub mod graph;
pub mod lifetime;
pub mod model;
pub mod path;
pub mod reactive;

pub use error::{Error, Result};
pub use graph::{Change, NodeKind, ReactGraph, Signal, SignalId, VariableSignal};
pub use lifetime::{CallbackKey, Lifetime};
pub use model::{Diff, HostMarker, Key, ListDiff, ListModel, MapDiff, MapModel, Meta, Model, Primitive};
pub use path::{Path, Segment};
pub use reactive::{Initializer, ReactiveModel};
