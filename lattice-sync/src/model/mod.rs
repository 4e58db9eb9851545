//! Model Trees
//!
//! This module defines the immutable tree value that a
//! [`ReactiveModel`](crate::ReactiveModel) owns, together with its delta
//! representation ([`Diff`]).
//!
//! # Variants
//!
//! A [`Model`] is one of:
//!
//! - `Map`: unordered key to model mapping, plus out-of-band [`Meta`]
//! - `List`: ordered children
//! - `Primitive`: a scalar leaf
//! - `Absent`: an explicit "no value", distinct from a missing key
//!
//! # Sharing
//!
//! Children live behind `Arc`, so cloning a tree is cheap and a patch only
//! copies the spine leading to the nodes it touches. Mutating methods such as
//! [`MapModel::insert`] go through `Arc::make_mut`: a node that is shared is
//! copied first, so no value anybody else can observe ever changes in place.

mod diff;
mod json;
mod meta;
mod value;

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::lifetime::Lifetime;

pub use diff::{Diff, ListDiff, MapDiff};
pub use meta::{HostMarker, Meta};
pub use value::{Key, Primitive};

/// An immutable tree value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Model {
    Map(MapModel),
    List(ListModel),
    Primitive(Primitive),
    #[default]
    Absent,
}

impl Model {
    /// An empty map node without metadata.
    pub fn empty_map() -> Self {
        Model::Map(MapModel::new())
    }

    /// Short variant name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Map(_) => "map",
            Model::List(_) => "list",
            Model::Primitive(_) => "primitive",
            Model::Absent => "absent",
        }
    }

    /// Whether a path can walk into this node.
    pub fn is_container(&self) -> bool {
        matches!(self, Model::Map(_) | Model::List(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Model::Absent)
    }

    pub fn as_map(&self) -> Option<&MapModel> {
        match self {
            Model::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListModel> {
        match self {
            Model::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Model::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// The string held by a `Str` primitive leaf.
    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }

    /// Metadata of a map node.
    pub fn meta(&self) -> Option<&Meta> {
        self.as_map().map(MapModel::meta)
    }

    /// Lifetime recorded in a map node's metadata.
    pub fn lifetime(&self) -> Option<&Lifetime> {
        self.meta().and_then(|meta| meta.lifetime.as_ref())
    }
}

impl From<MapModel> for Model {
    fn from(map: MapModel) -> Self {
        Model::Map(map)
    }
}

impl From<ListModel> for Model {
    fn from(list: ListModel) -> Self {
        Model::List(list)
    }
}

impl From<Primitive> for Model {
    fn from(p: Primitive) -> Self {
        Model::Primitive(p)
    }
}

impl From<bool> for Model {
    fn from(b: bool) -> Self {
        Model::Primitive(b.into())
    }
}

impl From<i64> for Model {
    fn from(n: i64) -> Self {
        Model::Primitive(n.into())
    }
}

impl From<i32> for Model {
    fn from(n: i32) -> Self {
        Model::Primitive(n.into())
    }
}

impl From<f64> for Model {
    fn from(x: f64) -> Self {
        Model::Primitive(x.into())
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        Model::Primitive(s.into())
    }
}

impl From<String> for Model {
    fn from(s: String) -> Self {
        Model::Primitive(s.into())
    }
}

fn meta_is_empty(meta: &Arc<Meta>) -> bool {
    meta.is_empty()
}

/// A map node.
///
/// Equality compares children only; [`Meta`] is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapModel {
    entries: Arc<IndexMap<Key, Model>>,
    #[serde(default, skip_serializing_if = "meta_is_empty")]
    meta: Arc<Meta>,
}

impl MapModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty map owned by `lifetime`.
    pub fn with_lifetime(lifetime: Lifetime) -> Self {
        Self {
            entries: Arc::default(),
            meta: Arc::new(Meta::with_lifetime(lifetime)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<Model>) -> Self {
        self.insert(key, value);
        self
    }

    /// Replace the metadata, keeping the children.
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Arc::new(meta);
        self
    }

    pub fn get(&self, key: &Key) -> Option<&Model> {
        self.entries.get(key)
    }

    /// Look up a string key.
    pub fn field(&self, name: &str) -> Option<&Model> {
        self.entries.get(&Key::from(name))
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Model>) -> Option<Model> {
        Arc::make_mut(&mut self.entries).insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &Key) -> Option<Model> {
        if !self.entries.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.entries).shift_remove(key)
    }

    /// Replace the child under `key` with `f(child)`.
    ///
    /// A missing child is passed to `f` as [`Model::Absent`].
    pub fn update(&mut self, key: Key, f: impl FnOnce(Model) -> Model) {
        let slot = Arc::make_mut(&mut self.entries)
            .entry(key)
            .or_insert(Model::Absent);
        let child = std::mem::take(slot);
        *slot = f(child);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Model)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        Arc::make_mut(&mut self.meta)
    }

    fn shares_entries(&self, other: &MapModel) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl PartialEq for MapModel {
    fn eq(&self, other: &Self) -> bool {
        self.shares_entries(other) || self.entries == other.entries
    }
}

impl<K: Into<Key>, V: Into<Model>> FromIterator<(K, V)> for MapModel {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(entries),
            meta: Arc::default(),
        }
    }
}

/// A list node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListModel {
    items: Arc<Vec<Model>>,
}

impl ListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&Model> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.items.iter()
    }

    pub fn push(&mut self, value: impl Into<Model>) {
        Arc::make_mut(&mut self.items).push(value.into());
    }

    /// Replace the element at `index` with `f(element)`.
    ///
    /// Indices past the end pad the list with [`Model::Absent`] first.
    pub fn update(&mut self, index: usize, f: impl FnOnce(Model) -> Model) {
        let items = Arc::make_mut(&mut self.items);
        if items.len() <= index {
            items.resize(index + 1, Model::Absent);
        }
        let child = std::mem::take(&mut items[index]);
        items[index] = f(child);
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.items.len() {
            Arc::make_mut(&mut self.items).truncate(len);
        }
    }

    fn shares_items(&self, other: &ListModel) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl PartialEq for ListModel {
    fn eq(&self, other: &Self) -> bool {
        self.shares_items(other) || self.items == other.items
    }
}

impl<V: Into<Model>> FromIterator<V> for ListModel {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            items: Arc::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<Vec<Model>> for ListModel {
    fn from(items: Vec<Model>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_metadata() {
        let plain = MapModel::new().with("a", 1);
        let mut tagged = plain.clone();
        tagged.meta_mut().tags.push("panel".into());

        assert_eq!(plain, tagged);
        assert!(plain.meta().tags.is_empty());
    }

    #[test]
    fn map_equality_ignores_key_order() {
        let ab = MapModel::new().with("a", 1).with("b", 2);
        let ba = MapModel::new().with("b", 2).with("a", 1);
        assert_eq!(ab, ba);
    }

    #[test]
    fn absent_differs_from_missing_key() {
        let missing = MapModel::new();
        let absent = MapModel::new().with("a", Model::Absent);
        assert_ne!(missing, absent);
        assert_eq!(absent.field("a"), Some(&Model::Absent));
    }

    #[test]
    fn mutation_copies_shared_children() {
        let original = MapModel::new().with("a", 1);
        let mut copy = original.clone();
        copy.insert("a", 2);

        assert_eq!(original.field("a"), Some(&Model::from(1)));
        assert_eq!(copy.field("a"), Some(&Model::from(2)));
    }

    #[test]
    fn list_update_pads_with_absent() {
        let mut list = ListModel::new();
        list.update(2, |_| Model::from("x"));
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), Some(&Model::Absent));
        assert_eq!(list.get(2), Some(&Model::from("x")));
    }

    #[test]
    fn lifetime_is_read_from_map_meta() {
        let lifetime = Lifetime::new();
        let model = Model::Map(MapModel::with_lifetime(lifetime.clone()));
        assert_eq!(model.lifetime(), Some(&lifetime));
        assert_eq!(Model::from(1).lifetime(), None);
    }
}
