//! Per-user state layered over the shared catalog mirror: exclusion
//! overlays (hidden entities plus their derived cascade) and engagement
//! rankings.

pub mod exclusions;
pub mod rankings;

pub use exclusions::ExclusionOverlay;
pub use rankings::{EngagementTotals, EntityStats, RankingEngine, StatsSort, UserStats};
