//! Map Metadata
//!
//! Annotations carried by a [`MapModel`](super::MapModel) next to its
//! children. Metadata never takes part in equality or diffing: two maps with
//! the same children are equal whatever their metadata says, and patching a
//! map keeps its metadata unless the map is replaced wholesale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lifetime::Lifetime;
use crate::path::Path;

/// Marks a subtree that was installed by the host builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMarker {
    /// Where the subtree was hosted.
    pub path: Path,
}

/// Metadata attached to a map node.
///
/// The lifetime is process-local and is never serialized; a mirror receiving
/// a hosted subtree sees its marker and tags but derives no lifetime from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Lifetime owning this subtree, set once it has been hosted.
    #[serde(skip)]
    pub lifetime: Option<Lifetime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostMarker>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Meta {
    pub fn with_lifetime(lifetime: Lifetime) -> Self {
        Self {
            lifetime: Some(lifetime),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lifetime.is_none()
            && self.host.is_none()
            && self.tags.is_empty()
            && self.extra.is_empty()
    }
}
