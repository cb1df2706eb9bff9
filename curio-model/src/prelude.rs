//! Curated re-exports for downstream consumers.

pub use crate::entities::{
    Clip, Gallery, Group, Image, Performer, Scene, Studio, Tag, UserOverlay,
};
pub use crate::error::{ModelError, Result as ModelResult};
pub use crate::filter::{
    ClipFilter, CriterionInput, DateCriterion, EntityFilter, GalleryFilter,
    GroupFilter, ImageFilter, Modifier, NumericCriterion, PerformerFilter,
    RelationCriterion, SceneFilter, SetMode, StudioFilter, TagFilter,
    TextCriterion,
};
pub use crate::ids::{EntityKey, InstanceId, UserId};
pub use crate::kind::EntityKind;
pub use crate::page::PageRequest;
pub use crate::sort::{SortDirection, SortKey};
