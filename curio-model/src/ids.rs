use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local user identity. Users exist only in Curio, never upstream.
pub type UserId = Uuid;

/// Identifier of one upstream media-server deployment.
///
/// The empty string is the legacy single-instance sentinel: rows imported
/// before multi-instance support carry it, and in filters it compares
/// equal to "any allowed instance" rather than "no instance".
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        InstanceId(id.into())
    }

    /// The legacy single-instance sentinel.
    pub fn legacy() -> Self {
        InstanceId(String::new())
    }

    pub fn is_legacy(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        InstanceId(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        InstanceId(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite identity of a catalog entity: the upstream-issued opaque id
/// plus the instance that issued it.
///
/// Two rows with equal `id` but different `instance` are distinct
/// entities. Every cross-entity relationship must be resolved through
/// both halves of this key; joining on the bare `id` silently merges
/// relationships belonging to different instances.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct EntityKey {
    pub id: String,
    #[serde(default)]
    pub instance: InstanceId,
}

impl EntityKey {
    pub fn new(id: impl Into<String>, instance: impl Into<InstanceId>) -> Self {
        EntityKey {
            id: id.into(),
            instance: instance.into(),
        }
    }

    /// A key carrying the legacy sentinel instance.
    pub fn legacy(id: impl Into<String>) -> Self {
        EntityKey {
            id: id.into(),
            instance: InstanceId::legacy(),
        }
    }

    /// Whether `other` identifies the same entity, honoring the legacy
    /// sentinel on either side.
    pub fn matches(&self, other: &EntityKey) -> bool {
        self.id == other.id
            && (self.instance == other.instance
                || self.instance.is_legacy()
                || other.instance.is_legacy())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_is_the_empty_legacy_key() {
        let key = EntityKey::default();
        assert!(key.id.is_empty());
        assert!(key.instance.is_legacy());
        assert_eq!(key, EntityKey::legacy(""));
    }

    #[test]
    fn legacy_sentinel_matches_any_instance() {
        let scoped = EntityKey::new("42", "alpha");
        let legacy = EntityKey::legacy("42");
        assert!(scoped.matches(&legacy));
        assert!(legacy.matches(&scoped));
        assert!(!scoped.matches(&EntityKey::new("42", "beta")));
        assert!(!legacy.matches(&EntityKey::legacy("43")));
    }
}
