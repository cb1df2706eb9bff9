//! Personalization and filtering engine over a mirrored media catalog.
//!
//! The catalog is synced from one or more upstream media-server
//! instances into Postgres; everything here layers per-user semantics on
//! top of that mirror: declarative filters compiled to SQL, per-user
//! overlays and exclusions, instance visibility, relation hydration,
//! cross-instance deduplication, and recommendation scoring.
//!
//! Entry points:
//! - [`query::QueryEngine`] — filtered/sorted/paginated views per kind.
//! - [`overlay::ExclusionOverlay`] — hide/unhide with derived cascades.
//! - [`hydrate::RelationHydrator`] — batch relation loading for pages.
//! - [`dedup::DedupResolver`] — canonical mapping across instances.
//! - [`score::Preferences`] — per-user preference state and scoring.

pub mod catalog;
pub mod dedup;
pub mod error;
pub mod hydrate;
pub mod instances;
pub mod overlay;
pub mod query;
pub mod score;
pub mod settings;

pub use catalog::MirrorState;
pub use dedup::{DedupResolver, DuplicateGroup};
pub use error::{CurioError, Result};
pub use hydrate::{ProxyRewriter, RelationHydrator};
pub use instances::InstanceRegistry;
pub use overlay::{ExclusionOverlay, RankingEngine};
pub use query::{Page, QueryEngine, QueryOptions};
pub use score::{Preferences, ScoreWeights};
pub use settings::{InstanceSettings, Settings};
