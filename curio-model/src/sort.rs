use serde::{Deserialize, Serialize};

/// Sort keys understood by the query planner. Unknown keys deserialize
/// through [`SortKey::parse`] and fall back to the default (creation
/// time, descending) rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    CreatedAt,
    Date,
    Rating,
    OCount,
    PlayCount,
    ViewCount,
    Duration,
    /// Seeded pseudo-random ordering, stable across paginated requests
    /// for a fixed seed.
    Random,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<SortKey> {
        match value {
            "name" | "title" => Some(SortKey::Name),
            "created_at" => Some(SortKey::CreatedAt),
            "date" => Some(SortKey::Date),
            "rating" => Some(SortKey::Rating),
            "o_count" => Some(SortKey::OCount),
            "play_count" => Some(SortKey::PlayCount),
            "view_count" => Some(SortKey::ViewCount),
            "duration" => Some(SortKey::Duration),
            "random" => Some(SortKey::Random),
            _ => None,
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::CreatedAt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Descending
    }
}
