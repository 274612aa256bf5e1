// SPDX-License-Identifier: MIT OR Apache-2.0
//! Object identity used to bind tracks to scene objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of an animated object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUuid(pub Uuid);

impl ObjectUuid {
    /// Create a new random object UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ObjectUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ObjectUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Ephemeral numeric id the scene assigns to a live object.
///
/// Scene ids change between sessions and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Names one track: an (object, property) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    /// Animated object
    pub object: ObjectUuid,
    /// Property path on the object (e.g. "position")
    pub property: String,
}

impl TrackKey {
    /// Create a key for an object property
    pub fn new(object: ObjectUuid, property: impl Into<String>) -> Self {
        Self {
            object,
            property: property.into(),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.property)
    }
}
