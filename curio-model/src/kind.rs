use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The eight catalog entity kinds mirrored from upstream instances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Scene,
    Performer,
    Studio,
    Tag,
    Gallery,
    Group,
    Image,
    Clip,
}

impl EntityKind {
    pub fn all() -> &'static [EntityKind] {
        use EntityKind::*;
        &[Scene, Performer, Studio, Tag, Gallery, Group, Image, Clip]
    }

    /// Canonical lowercase name used in overlay and exclusion rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Scene => "scene",
            EntityKind::Performer => "performer",
            EntityKind::Studio => "studio",
            EntityKind::Tag => "tag",
            EntityKind::Gallery => "gallery",
            EntityKind::Group => "group",
            EntityKind::Image => "image",
            EntityKind::Clip => "clip",
        }
    }

    /// Mirror table backing this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Scene => "scenes",
            EntityKind::Performer => "performers",
            EntityKind::Studio => "studios",
            EntityKind::Tag => "tags",
            EntityKind::Gallery => "galleries",
            // `GROUPS` is a reserved word in Postgres 11+.
            EntityKind::Group => "media_groups",
            EntityKind::Image => "images",
            EntityKind::Clip => "clips",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ModelError> {
        match value {
            "scene" => Ok(EntityKind::Scene),
            "performer" => Ok(EntityKind::Performer),
            "studio" => Ok(EntityKind::Studio),
            "tag" => Ok(EntityKind::Tag),
            "gallery" => Ok(EntityKind::Gallery),
            "group" => Ok(EntityKind::Group),
            "image" => Ok(EntityKind::Image),
            "clip" => Ok(EntityKind::Clip),
            other => Err(ModelError::UnknownEntityKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in EntityKind::all() {
            assert_eq!(EntityKind::parse(kind.as_str()).unwrap(), *kind);
        }
        assert!(EntityKind::parse("movie").is_err());
    }
}
