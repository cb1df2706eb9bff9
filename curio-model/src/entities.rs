//! Plain per-kind entity records.
//!
//! These are the public shapes produced by the query executor and the
//! relation hydrator. Relation vectors are empty until hydrated; the
//! [`UserOverlay`] defaults to "no opinion" when the requesting user has
//! no overlay row for the entity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityKey;

/// Per-user overlay onto a catalog entity. Logically a left-join result
/// that defaults to no opinion when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserOverlay {
    pub rating: Option<f64>,
    pub favorite: bool,
    pub play_count: i64,
    pub o_count: i64,
    pub view_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    pub key: EntityKey,
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<NaiveDate>,
    /// Upstream-supplied rating on the 0..=100 scale.
    pub rating: Option<f64>,
    pub duration: Option<f64>,
    pub organized: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub studio_key: Option<EntityKey>,
    /// Shared external-registry id used for cross-instance deduplication.
    pub external_id: Option<String>,
    pub screenshot_url: Option<String>,
    pub preview_url: Option<String>,
    pub stream_url: Option<String>,
    /// Tags inherited from performers, studio, and groups, minus tags
    /// directly attached to the scene. Denormalized in batch after sync.
    pub inherited_tag_ids: Vec<String>,
    pub overlay: UserOverlay,
    pub studio: Option<Studio>,
    pub performers: Vec<Performer>,
    pub tags: Vec<Tag>,
    pub galleries: Vec<Gallery>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performer {
    pub key: EntityKey,
    pub name: String,
    pub details: Option<String>,
    pub rating: Option<f64>,
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Studio {
    pub key: EntityKey,
    pub name: String,
    pub details: Option<String>,
    pub rating: Option<f64>,
    pub parent_key: Option<EntityKey>,
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tag {
    pub key: EntityKey,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gallery {
    pub key: EntityKey,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub performers: Vec<Performer>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    pub key: EntityKey,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub key: EntityKey,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub performers: Vec<Performer>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clip {
    pub key: EntityKey,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub video_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub overlay: UserOverlay,
    pub tags: Vec<Tag>,
}
