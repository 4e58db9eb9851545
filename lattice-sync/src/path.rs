//! Paths
//!
//! A [`Path`] addresses a node inside a [`Model`] tree as a sequence of
//! [`Segment`]s. Besides plain keys, a path may contain the [`Segment::Last`]
//! sentinel:
//!
//! - when writing (`put_in`, `update_in`) it appends a new element to the
//!   enclosing list
//! - when reading (`get_in`) it addresses the last element of that list
//!
//! so `p.get_in(&p.put_in(m, v))` yields `v` for every path.
//!
//! Paths also walk [`Diff`] trees, which is how a transaction decides which
//! subscriptions it touched.

use std::fmt;
use std::ops::Div;

use serde::{Deserialize, Serialize};

use crate::model::{Diff, Key, ListModel, MapDiff, MapModel, Model};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Key(Key),
    /// Append to (or read the last element of) the enclosing list.
    Last,
}

impl From<Key> for Segment {
    fn from(key: Key) -> Self {
        Segment::Key(key)
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Key(s.into())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Key(s.into())
    }
}

impl From<i64> for Segment {
    fn from(n: i64) -> Self {
        Segment::Key(n.into())
    }
}

impl From<i32> for Segment {
    fn from(n: i32) -> Self {
        Segment::Key(n.into())
    }
}

impl From<usize> for Segment {
    fn from(n: usize) -> Self {
        Segment::Key(n.into())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Last => f.write_str("-"),
        }
    }
}

/// An immutable address into a model tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, addressing the root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// A new path with `segment` appended.
    pub fn div(&self, segment: impl Into<Segment>) -> Path {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(segment.into());
        Path { segments }
    }

    /// A new path without the last `n` segments.
    pub fn drop_last(&self, n: usize) -> Path {
        let keep = self.segments.len().saturating_sub(n);
        Path {
            segments: self.segments[..keep].to_vec(),
        }
    }

    pub fn parent(&self) -> Option<Path> {
        (!self.is_root()).then(|| self.drop_last(1))
    }

    /// Whether `other` starts with all of this path's segments.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// The node at this path, if every step lands on a container.
    pub fn get_in<'m>(&self, model: &'m Model) -> Option<&'m Model> {
        self.segments
            .iter()
            .try_fold(model, |node, segment| step(node, segment))
    }

    /// Install `value` at this path.
    ///
    /// Nodes along the way that cannot hold the next segment are replaced by
    /// fresh containers: a map for a key, a list for [`Segment::Last`].
    pub fn put_in(&self, model: Model, value: impl Into<Model>) -> Model {
        let value = value.into();
        self.update_in(model, move |_| value)
    }

    /// Replace the node at this path with `f(node)`.
    ///
    /// A missing node is passed to `f` as [`Model::Absent`]; intermediate
    /// containers are created as in [`put_in`](Self::put_in).
    pub fn update_in(&self, model: Model, f: impl FnOnce(Model) -> Model) -> Model {
        update_at(model, &self.segments, f)
    }

    /// Replace every `Last` segment that resolves in `model` by the index of
    /// the element it currently addresses.
    ///
    /// Segments past the first step that does not resolve are kept as is.
    pub fn resolve(&self, model: &Model) -> Path {
        let mut segments = Vec::with_capacity(self.segments.len());
        let mut current = Some(model);
        for segment in &self.segments {
            let concrete = match (current, segment) {
                (Some(Model::List(list)), Segment::Last) if !list.is_empty() => {
                    Segment::Key(Key::from(list.len() - 1))
                }
                _ => segment.clone(),
            };
            current = current.and_then(|node| step(node, &concrete));
            segments.push(concrete);
        }
        Path { segments }
    }

    /// The diff at this path, if the walk reaches one.
    pub fn get_in_diff<'d>(&self, diff: &'d Diff) -> Option<&'d Diff> {
        let mut current = diff;
        for segment in &self.segments {
            current = match (current, segment) {
                (Diff::Map(map), Segment::Key(key)) => map.get(key)?,
                (Diff::List(list), Segment::Key(key)) => list.changed.get(&key.as_index()?)?,
                (Diff::List(list), Segment::Last) => {
                    list.changed.get(&list.len.checked_sub(1)?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether the node at this path may have changed under `diff`.
    ///
    /// Besides the nodes [`get_in_diff`](Self::get_in_diff) reaches, this
    /// counts removed keys, truncated indices and everything below a
    /// wholesale replace as touched. It can report a node whose value ended
    /// up equal; subscribers compare values before waking.
    pub fn touches(&self, diff: &Diff) -> bool {
        touches_at(&self.segments, diff)
    }

    /// [`touches`](Self::touches) for a root map diff.
    pub fn touches_map(&self, diff: &MapDiff) -> bool {
        touches_map_at(&self.segments, diff)
    }
}

fn step<'m>(node: &'m Model, segment: &Segment) -> Option<&'m Model> {
    match (node, segment) {
        (Model::Map(map), Segment::Key(key)) => map.get(key),
        (Model::List(list), Segment::Key(key)) => list.get(key.as_index()?),
        (Model::List(list), Segment::Last) => list.last(),
        _ => None,
    }
}

fn update_at(model: Model, segments: &[Segment], f: impl FnOnce(Model) -> Model) -> Model {
    let Some((head, rest)) = segments.split_first() else {
        return f(model);
    };

    match (model, head) {
        (Model::Map(mut map), Segment::Key(key)) => {
            map.update(key.clone(), |child| update_at(child, rest, f));
            Model::Map(map)
        }
        (Model::List(mut list), Segment::Key(key)) if key.as_index().is_some() => {
            let index = key.as_index().unwrap_or_default();
            list.update(index, |child| update_at(child, rest, f));
            Model::List(list)
        }
        (Model::List(mut list), Segment::Last) => {
            list.push(update_at(Model::Absent, rest, f));
            Model::List(list)
        }
        (_, Segment::Key(key)) => {
            let mut map = MapModel::new();
            map.update(key.clone(), |_| update_at(Model::Absent, rest, f));
            Model::Map(map)
        }
        (_, Segment::Last) => {
            let mut list = ListModel::new();
            list.push(update_at(Model::Absent, rest, f));
            Model::List(list)
        }
    }
}

fn touches_at(segments: &[Segment], diff: &Diff) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return true;
    };

    match diff {
        Diff::Map(map) => touches_map_at(segments, map),
        Diff::List(list) => match head {
            Segment::Key(key) => match key.as_index() {
                Some(index) => match list.changed.get(&index) {
                    Some(child) => touches_at(rest, child),
                    // Truncated away, or untouched.
                    None => index >= list.len,
                },
                None => false,
            },
            // The last element moves whenever the length might have.
            Segment::Last => true,
        },
        Diff::Value(_) | Diff::Primitive(_) => true,
    }
}

fn touches_map_at(segments: &[Segment], diff: &MapDiff) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return true;
    };

    match head {
        Segment::Key(key) if diff.is_removed(key) => true,
        Segment::Key(key) => diff.get(key).is_some_and(|child| touches_at(rest, child)),
        Segment::Last => false,
    }
}

impl<S: Into<Segment>> Div<S> for Path {
    type Output = Path;

    fn div(mut self, segment: S) -> Path {
        self.segments.push(segment.into());
        self
    }
}

impl<S: Into<Segment>> Div<S> for &Path {
    type Output = Path;

    fn div(self, segment: S) -> Path {
        Path::div(self, segment)
    }
}

impl<S: Into<Segment>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Path::new(iter)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Build a [`Path`] from segments.
///
/// ```
/// use lattice_sync::{path, Segment};
///
/// let p = path!["panels", Segment::Last, "title"];
/// assert_eq!(p.to_string(), "/panels/-/title");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($segment:expr),+ $(,)?) => {
        $crate::Path::root() $(/ $segment)+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Model {
        Model::Map(
            MapModel::new()
                .with("b", MapModel::new().with("c", "x"))
                .with("items", ListModel::from_iter([10, 20])),
        )
    }

    #[test]
    fn div_and_drop_last() {
        let p = Path::root() / "b" / "c";
        assert_eq!(p, Path::new(["b", "c"]));
        assert_eq!(p.drop_last(1), Path::new(["b"]));
        assert_eq!(p.drop_last(5), Path::root());
        assert_eq!(p.parent(), Some(Path::new(["b"])));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn prefix_is_component_wise() {
        let b = Path::new(["b"]);
        let bc = Path::new(["b", "c"]);
        assert!(b.is_prefix_of(&bc));
        assert!(bc.is_prefix_of(&bc));
        assert!(!bc.is_prefix_of(&b));
        assert!(!Path::new(["bc"]).is_prefix_of(&bc));
        assert!(Path::root().is_prefix_of(&b));
    }

    #[test]
    fn get_in_walks_maps_and_lists() {
        let model = tree();
        assert_eq!(path!["b", "c"].get_in(&model), Some(&Model::from("x")));
        assert_eq!(path!["items", 1].get_in(&model), Some(&Model::from(20)));
        assert_eq!(path!["items", Segment::Last].get_in(&model), Some(&Model::from(20)));
        assert_eq!(path!["b", "c", "d"].get_in(&model), None);
        assert_eq!(path!["missing"].get_in(&model), None);
        assert_eq!(Path::root().get_in(&model), Some(&model));
    }

    #[test]
    fn put_in_creates_intermediate_maps() {
        let model = path!["x", "y", "z"].put_in(Model::empty_map(), 1);
        assert_eq!(path!["x", "y", "z"].get_in(&model), Some(&Model::from(1)));
        assert!(path!["x", "y"].get_in(&model).is_some_and(|m| m.as_map().is_some()));
    }

    #[test]
    fn put_in_replaces_non_containers() {
        let model = path!["b", "c", "d"].put_in(tree(), true);
        assert_eq!(path!["b", "c", "d"].get_in(&model), Some(&Model::from(true)));
    }

    #[test]
    fn last_appends_to_list() {
        let model = path!["items", Segment::Last].put_in(tree(), 30);
        let items = path!["items"].get_in(&model).and_then(Model::as_list).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items.last(), Some(&Model::from(30)));

        let root = Path::new([Segment::Last]).put_in(Model::List(ListModel::new()), "a");
        assert_eq!(root, Model::List(ListModel::from_iter(["a"])));
    }

    #[test]
    fn put_in_keeps_siblings_and_metadata() {
        let lifetime = crate::lifetime::Lifetime::new();
        let model = Model::Map(MapModel::with_lifetime(lifetime.clone()).with("keep", 1));
        let model = path!["b", "c"].put_in(model, "x");
        assert_eq!(path!["keep"].get_in(&model), Some(&Model::from(1)));
        assert_eq!(model.lifetime(), Some(&lifetime));
    }

    #[test]
    fn resolve_pins_last_to_an_index() {
        let model = tree();
        assert_eq!(
            path!["items", Segment::Last].resolve(&model),
            path!["items", 1usize]
        );
        assert_eq!(
            path!["b", Segment::Last].resolve(&model),
            path!["b", Segment::Last]
        );
    }

    #[test]
    fn diff_walk_finds_touched_paths() {
        let old = tree();
        let new = path!["b", "c"].put_in(old.clone(), "y");
        let diff = old.diff(&new).unwrap();

        assert_eq!(
            path!["b", "c"].get_in_diff(&diff),
            Some(&Diff::Primitive("y".into()))
        );
        assert!(path!["b"].touches(&diff));
        assert!(path!["b", "c"].touches(&diff));
        assert!(!path!["items"].touches(&diff));
        assert!(Path::root().touches(&diff));
    }

    #[test]
    fn removal_and_replace_count_as_touched() {
        let old = tree();
        let Model::Map(mut map) = old.clone() else { unreachable!() };
        map.remove(&Key::from("b"));
        map.insert("items", "gone");
        let diff = old.diff(&Model::Map(map)).unwrap();

        assert!(path!["b", "c"].touches(&diff));
        assert!(path!["items", 0].touches(&diff));
        assert_eq!(path!["b", "c"].get_in_diff(&diff), None);
    }

    #[test]
    fn display() {
        assert_eq!(Path::root().to_string(), "/");
        assert_eq!(path!["a", 3, Segment::Last].to_string(), "/a/3/-");
    }
}
