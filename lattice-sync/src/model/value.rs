//! Map keys and primitive leaf values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A key in a [`MapModel`](super::MapModel), also used as a path segment.
///
/// `Int` keys double as list indices when a path walks into a list.
///
/// Keys serialize untagged: a string key is a plain string and an integer
/// key a plain integer, so maps keyed by strings are ordinary JSON objects.
/// JSON object keys are always strings, so an `Int` map key read back from
/// JSON comes back as the equivalent `Str`; self-describing binary formats
/// such as MessagePack keep the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl Key {
    /// The key as a list index, if it is a non-negative integer.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Int(n) => usize::try_from(*n).ok(),
            Key::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n.into())
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

/// An immutable scalar held by a primitive leaf.
///
/// Two primitives of different kinds (say `Int` and `Str`) count as different
/// model variants: diffing them yields a wholesale replace rather than a
/// primitive diff.
///
/// Floats compare by total order, so `NaN == NaN` and a model holding `NaN`
/// still diffs to nothing against itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Primitive {
    /// Whether both values are the same scalar kind.
    pub fn same_kind(&self, other: &Primitive) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::Bool(a), Primitive::Bool(b)) => a == b,
            (Primitive::Int(a), Primitive::Int(b)) => a == b,
            (Primitive::Float(a), Primitive::Float(b)) => a.total_cmp(b).is_eq(),
            (Primitive::Str(a), Primitive::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Primitive {}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::Int(n) => write!(f, "{n}"),
            Primitive::Float(x) => write!(f, "{x}"),
            Primitive::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Primitive::Int(n)
    }
}

impl From<i32> for Primitive {
    fn from(n: i32) -> Self {
        Primitive::Int(n.into())
    }
}

impl From<f64> for Primitive {
    fn from(x: f64) -> Self {
        Primitive::Float(x)
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::Str(s.to_owned())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_keys_become_indices() {
        assert_eq!(Key::Int(3).as_index(), Some(3));
        assert_eq!(Key::Int(-1).as_index(), None);
        assert_eq!(Key::from("3").as_index(), None);
    }

    #[test]
    fn keys_serialize_untagged() {
        assert_eq!(serde_json::to_string(&Key::from("title")).unwrap(), r#""title""#);
        assert_eq!(serde_json::to_string(&Key::Int(2)).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Key>("2").unwrap(), Key::Int(2));
        assert_eq!(serde_json::from_str::<Key>(r#""2""#).unwrap(), Key::from("2"));
    }

    #[test]
    fn nan_equals_itself() {
        let nan = Primitive::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
    }

    #[test]
    fn kinds_are_distinguished() {
        assert!(Primitive::from(1).same_kind(&Primitive::from(2)));
        assert!(!Primitive::from(1).same_kind(&Primitive::from("1")));
        assert_ne!(Primitive::from(1), Primitive::from(1.0));
    }
}
