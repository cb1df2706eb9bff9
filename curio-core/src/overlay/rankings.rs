//! Per-user engagement rankings, aggregated from overlay counters.
//!
//! Rankings are keyed by the bare upstream id: a user who plays the same
//! scene on two instances engages with one piece of content, so counters
//! sum across instances before ranking. The engagement rate normalizes
//! the raw counter by how often the entity appears in the library, so a
//! performer in two scenes with two o's outranks one in two hundred
//! scenes with three. Percentiles are computed with a window over the
//! user's own rows per kind, so "percentile 90" means "engaged with more
//! than 90% of what this user has touched", not a global figure.

use sqlx::{PgPool, Row};
use tracing::debug;

use curio_model::{EntityKind, UserId};

use crate::error::{CurioError, Result};

/// Aggregated engagement for one bare entity id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStats {
    pub entity_id: String,
    pub play_count: i64,
    pub o_count: i64,
    pub view_count: i64,
    pub play_duration: f64,
    pub engagement_rate: f64,
    pub percentile: f64,
}

/// Per-user engagement totals summed over every ranked entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementTotals {
    pub play_count: i64,
    pub o_count: i64,
    pub view_count: i64,
    pub play_duration: f64,
}

/// The full stats view: library size per kind, the user's engagement
/// totals, and the top-N ranked entities of each kind.
#[derive(Debug, Clone)]
pub struct UserStats {
    pub library_counts: Vec<(EntityKind, i64)>,
    pub totals: EngagementTotals,
    pub top: Vec<(EntityKind, Vec<EntityStats>)>,
}

/// Validated sort column for stats listings. Arbitrary column names from
/// callers never reach the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSort {
    OCount,
    PlayCount,
    ViewCount,
    PlayDuration,
    EngagementRate,
    Percentile,
}

impl StatsSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "o_count" => Some(StatsSort::OCount),
            "play_count" => Some(StatsSort::PlayCount),
            "view_count" => Some(StatsSort::ViewCount),
            "play_duration" => Some(StatsSort::PlayDuration),
            "engagement_rate" => Some(StatsSort::EngagementRate),
            "percentile" => Some(StatsSort::Percentile),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            StatsSort::OCount => "o_count",
            StatsSort::PlayCount => "play_count",
            StatsSort::ViewCount => "view_count",
            StatsSort::PlayDuration => "play_duration",
            StatsSort::EngagementRate => "engagement_rate",
            StatsSort::Percentile => "percentile",
        }
    }
}

/// Raw engagement per library appearance. An entity with no appearance
/// rows (a scene, or an orphaned id) counts as appearing once.
pub fn engagement_rate(o_count: i64, appearances: i64) -> f64 {
    o_count as f64 / appearances.max(1) as f64
}

#[derive(Debug)]
pub struct RankingEngine {
    pool: PgPool,
}

impl RankingEngine {
    pub fn new(pool: PgPool) -> Self {
        RankingEngine { pool }
    }

    /// Rebuilds one user's ranking rows from their overlay counters.
    /// Replace-then-insert keeps rows for entities the user no longer
    /// has counters for from lingering.
    pub async fn recompute_user(&self, user_id: UserId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_entity_rankings WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Presence counts how often an entity appears across the
        // library: scenes per performer, per studio, per tag. Kinds
        // without a presence notion (scenes themselves) normalize by 1.
        let result = sqlx::query(
            "WITH agg AS ( \
                 SELECT entity_kind, entity_id, \
                        SUM(play_count)::bigint AS play_count, \
                        SUM(o_count)::bigint AS o_count, \
                        SUM(view_count)::bigint AS view_count, \
                        SUM(play_duration)::float8 AS play_duration \
                 FROM user_entity_overlays \
                 WHERE user_id = $1 \
                   AND (play_count > 0 OR o_count > 0 \
                        OR view_count > 0 OR play_duration > 0) \
                 GROUP BY entity_kind, entity_id \
             ), presence AS ( \
                 SELECT 'performer' AS entity_kind, performer_id AS entity_id, \
                        COUNT(*)::float8 AS appearances \
                 FROM scene_performers GROUP BY performer_id \
                 UNION ALL \
                 SELECT 'studio', studio_id, COUNT(*)::float8 \
                 FROM scenes WHERE studio_id IS NOT NULL GROUP BY studio_id \
                 UNION ALL \
                 SELECT 'tag', tag_id, COUNT(*)::float8 \
                 FROM scene_tags GROUP BY tag_id \
             ) \
             INSERT INTO user_entity_rankings \
             (user_id, entity_kind, entity_id, play_count, o_count, \
              view_count, play_duration, engagement_rate, percentile) \
             SELECT $1, a.entity_kind, a.entity_id, a.play_count, a.o_count, \
                    a.view_count, a.play_duration, \
                    a.o_count::float8 / GREATEST(COALESCE(p.appearances, 1), 1), \
                    percent_rank() OVER ( \
                        PARTITION BY a.entity_kind \
                        ORDER BY a.o_count, a.play_count) * 100 \
             FROM agg a \
             LEFT JOIN presence p ON p.entity_kind = a.entity_kind \
              AND p.entity_id = a.entity_id",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(user = %user_id, rows = result.rows_affected(), "rankings recomputed");
        Ok(result.rows_affected())
    }

    /// Top entities of one kind for a user, ordered by a validated
    /// column.
    pub async fn top_entities(
        &self,
        user_id: UserId,
        kind: EntityKind,
        sort_by: &str,
        limit: i64,
    ) -> Result<Vec<EntityStats>> {
        let sort = parse_sort(sort_by)?;
        self.top_for(user_id, kind, sort, limit).await
    }

    /// The aggregate stats view: library counts per kind, engagement
    /// totals, and the top-N ranked entities of every kind.
    pub async fn user_stats(
        &self,
        user_id: UserId,
        sort_by: &str,
        limit: i64,
    ) -> Result<UserStats> {
        let sort = parse_sort(sort_by)?;

        let mut counts_sql = String::new();
        for kind in EntityKind::all() {
            if !counts_sql.is_empty() {
                counts_sql.push_str(" UNION ALL ");
            }
            counts_sql.push_str(&format!(
                "SELECT '{kind}' AS kind, COUNT(*) AS total FROM {table}",
                kind = kind.as_str(),
                table = kind.table()
            ));
        }
        let library_counts = sqlx::query(&counts_sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                let kind = EntityKind::parse(&row.get::<String, _>("kind"))?;
                Ok((kind, row.try_get::<i64, _>("total")?))
            })
            .collect::<Result<Vec<_>>>()?;

        let totals_row = sqlx::query(
            "SELECT COALESCE(SUM(play_count), 0)::bigint AS play_count, \
                    COALESCE(SUM(o_count), 0)::bigint AS o_count, \
                    COALESCE(SUM(view_count), 0)::bigint AS view_count, \
                    COALESCE(SUM(play_duration), 0)::float8 AS play_duration \
             FROM user_entity_rankings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let totals = EngagementTotals {
            play_count: totals_row.try_get("play_count")?,
            o_count: totals_row.try_get("o_count")?,
            view_count: totals_row.try_get("view_count")?,
            play_duration: totals_row.try_get("play_duration")?,
        };

        let mut top = Vec::with_capacity(EntityKind::all().len());
        for kind in EntityKind::all() {
            let stats = self.top_for(user_id, *kind, sort, limit).await?;
            top.push((*kind, stats));
        }

        Ok(UserStats {
            library_counts,
            totals,
            top,
        })
    }

    async fn top_for(
        &self,
        user_id: UserId,
        kind: EntityKind,
        sort: StatsSort,
        limit: i64,
    ) -> Result<Vec<EntityStats>> {
        let sql = format!(
            "SELECT entity_id, play_count, o_count, view_count, \
                    play_duration, engagement_rate, percentile \
             FROM user_entity_rankings \
             WHERE user_id = $1 AND entity_kind = $2 \
             ORDER BY {column} DESC, entity_id ASC LIMIT $3",
            column = sort.column()
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(kind.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(EntityStats {
                    entity_id: row.try_get("entity_id")?,
                    play_count: row.try_get("play_count")?,
                    o_count: row.try_get("o_count")?,
                    view_count: row.try_get("view_count")?,
                    play_duration: row.try_get("play_duration")?,
                    engagement_rate: row.try_get("engagement_rate")?,
                    percentile: row.try_get("percentile")?,
                })
            })
            .collect()
    }
}

fn parse_sort(sort_by: &str) -> Result<StatsSort> {
    StatsSort::parse(sort_by).ok_or_else(|| {
        CurioError::InvalidInput(curio_model::ModelError::InvalidFilterValue {
            field: "sort_by".to_string(),
            reason: format!("unsupported stats sort `{sort_by}`"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_columns_are_rejected() {
        assert_eq!(StatsSort::parse("o_count"), Some(StatsSort::OCount));
        assert_eq!(
            StatsSort::parse("play_duration"),
            Some(StatsSort::PlayDuration)
        );
        assert_eq!(StatsSort::parse("percentile"), Some(StatsSort::Percentile));
        assert_eq!(StatsSort::parse("o_count; DROP TABLE scenes"), None);
        assert_eq!(StatsSort::parse(""), None);
    }

    #[test]
    fn engagement_rate_normalizes_by_library_presence() {
        // Six o's over three scene appearances.
        assert_eq!(engagement_rate(6, 3), 2.0);
        assert_eq!(engagement_rate(0, 10), 0.0);
        // No presence rows clamps to one appearance.
        assert_eq!(engagement_rate(5, 0), 5.0);
    }
}
