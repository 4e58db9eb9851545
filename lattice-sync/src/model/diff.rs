//! Structural Diff and Patch
//!
//! A [`Diff`] describes how to turn one [`Model`] into another. Diffs
//! mirror the shape of the model:
//!
//! - `Map`: per-key changes plus removed keys; untouched keys are absent
//! - `List`: the new length plus per-index changes
//! - `Value`: replace the node wholesale
//! - `Primitive`: a new scalar of the same kind
//!
//! # Laws
//!
//! For any two models `a` and `b`:
//!
//! - `a.diff(&b)` is `None` exactly when `a == b`
//! - if `a.diff(&b)` is `Some(d)`, then `a.patch(&d) == Ok(b)`
//!
//! A wholesale `Value` replace is produced whenever the two nodes are of
//! different variants (or hold primitives of different kinds). Every other
//! diff variant only applies to a model of the matching variant.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Key, ListModel, MapModel, Model, Primitive};
use crate::error::{Error, Result};

/// A change to a model node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diff {
    Map(MapDiff),
    List(ListDiff),
    Value(Model),
    Primitive(Primitive),
}

impl Diff {
    /// Short variant name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Diff::Map(_) => "map",
            Diff::List(_) => "list",
            Diff::Value(_) => "value",
            Diff::Primitive(_) => "primitive",
        }
    }

    pub fn as_map(&self) -> Option<&MapDiff> {
        match self {
            Diff::Map(diff) => Some(diff),
            _ => None,
        }
    }
}

/// Per-key changes to a map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDiff {
    /// Changed or added keys.
    pub changed: IndexMap<Key, Diff>,
    /// Keys present before and missing after.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<Key>,
}

impl MapDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Diff> {
        self.changed.get(key)
    }

    pub fn is_removed(&self, key: &Key) -> bool {
        self.removed.contains(key)
    }
}

/// Per-index changes to a list.
///
/// Indices at or past the old length are insertions; they are always
/// `Value` diffs because they were computed against [`Model::Absent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListDiff {
    /// Length of the list after the change.
    pub len: usize,
    pub changed: BTreeMap<usize, Diff>,
}

impl Model {
    /// Compute the diff that turns `self` into `other`.
    ///
    /// Returns `None` when the two models are equal.
    pub fn diff(&self, other: &Model) -> Option<Diff> {
        match (self, other) {
            (Model::Map(old), Model::Map(new)) => old.diff(new).map(Diff::Map),
            (Model::List(old), Model::List(new)) => old.diff(new).map(Diff::List),
            (Model::Primitive(old), Model::Primitive(new)) if old.same_kind(new) => {
                (old != new).then(|| Diff::Primitive(new.clone()))
            }
            (Model::Absent, Model::Absent) => None,
            _ => Some(Diff::Value(other.clone())),
        }
    }

    /// Apply `diff` to a copy of this model.
    ///
    /// Fails with [`Error::DiffMismatch`] when a structural diff does not
    /// match the variant of the model it is applied to.
    pub fn patch(&self, diff: &Diff) -> Result<Model> {
        match (self, diff) {
            (_, Diff::Value(model)) => Ok(model.clone()),
            (Model::Map(map), Diff::Map(diff)) => map.patch(diff).map(Model::Map),
            (Model::List(list), Diff::List(diff)) => list.patch(diff).map(Model::List),
            (Model::Primitive(old), Diff::Primitive(new)) if old.same_kind(new) => {
                Ok(Model::Primitive(new.clone()))
            }
            (model, diff) => Err(Error::DiffMismatch {
                model: model.kind(),
                diff: diff.kind(),
            }),
        }
    }
}

impl MapModel {
    /// Compute the per-key diff that turns `self` into `other`.
    pub fn diff(&self, other: &MapModel) -> Option<MapDiff> {
        if self.shares_entries(other) {
            return None;
        }

        let mut changed = IndexMap::new();
        for (key, new) in other.iter() {
            let diff = match self.get(key) {
                Some(old) => old.diff(new),
                None => Some(Diff::Value(new.clone())),
            };
            if let Some(diff) = diff {
                changed.insert(key.clone(), diff);
            }
        }
        let removed = self
            .keys()
            .filter(|key| !other.contains_key(key))
            .cloned()
            .collect();

        let diff = MapDiff { changed, removed };
        (!diff.is_empty()).then_some(diff)
    }

    /// Apply a map diff. Metadata is kept.
    pub fn patch(&self, diff: &MapDiff) -> Result<MapModel> {
        let mut next = self.clone();
        for key in &diff.removed {
            next.remove(key);
        }
        for (key, child) in &diff.changed {
            let patched = match next.get(key) {
                Some(old) => old.patch(child)?,
                None => Model::Absent.patch(child)?,
            };
            next.insert(key.clone(), patched);
        }
        Ok(next)
    }
}

impl ListModel {
    /// Compute the index-wise diff that turns `self` into `other`.
    pub fn diff(&self, other: &ListModel) -> Option<ListDiff> {
        if self.shares_items(other) {
            return None;
        }

        let mut changed = BTreeMap::new();
        for (index, new) in other.iter().enumerate() {
            let diff = match self.get(index) {
                Some(old) => old.diff(new),
                None => Some(Diff::Value(new.clone())),
            };
            if let Some(diff) = diff {
                changed.insert(index, diff);
            }
        }

        if changed.is_empty() && self.len() == other.len() {
            return None;
        }
        Some(ListDiff {
            len: other.len(),
            changed,
        })
    }

    pub fn patch(&self, diff: &ListDiff) -> Result<ListModel> {
        let mut next = self.clone();
        next.truncate(diff.len);
        for (&index, child) in &diff.changed {
            let patched = match next.get(index) {
                Some(old) => old.patch(child)?,
                None => Model::Absent.patch(child)?,
            };
            next.update(index, |_| patched);
        }
        if next.len() < diff.len {
            next.update(diff.len - 1, |child| child);
        }
        Ok(next)
    }
}
