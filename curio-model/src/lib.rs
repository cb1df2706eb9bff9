//! Core data model definitions shared across Curio crates.
//!
//! Every catalog entity mirrored from an upstream media server is keyed by
//! a [`EntityKey`] composite identity: the upstream-issued id plus the
//! [`InstanceId`] of the instance that issued it. Bare ids are never a
//! safe unique identifier across instances.

pub mod entities;
pub mod error;
pub mod filter;
pub mod ids;
pub mod kind;
pub mod page;
pub mod sort;

pub mod prelude;

pub use entities::{
    Clip, Gallery, Group, Image, Performer, Scene, Studio, Tag, UserOverlay,
};
pub use error::{ModelError, Result as ModelResult};
pub use filter::{
    ClipFilter, CriterionInput, DateCriterion, EntityFilter, GalleryFilter,
    GroupFilter, ImageFilter, Modifier, NumericCriterion, PerformerFilter,
    RelationCriterion, SceneFilter, SetMode, StudioFilter, TagFilter,
    TextCriterion,
};
pub use ids::{EntityKey, InstanceId, UserId};
pub use kind::EntityKind;
pub use page::PageRequest;
pub use sort::{SortDirection, SortKey};
