//! Per-user preference state, built once per scoring session.

use std::collections::{HashMap, HashSet};

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use curio_model::{EntityKey, InstanceId, Performer, Scene, Tag, UserId};

use crate::error::Result;
use crate::score::{scene_multiplier, ScoreWeights};

/// Explicit, derived, and implicit preference signals for one user.
///
/// Explicit and derived state is keyed by composite key; implicit state
/// comes from the rankings table, which aggregates across instances and
/// therefore keys by bare id.
#[derive(Debug, Default)]
pub struct Preferences {
    pub favorite_performers: HashSet<EntityKey>,
    pub rated_performers: HashSet<EntityKey>,
    pub favorite_studios: HashSet<EntityKey>,
    pub rated_studios: HashSet<EntityKey>,
    pub favorite_tags: HashSet<EntityKey>,
    pub rated_tags: HashSet<EntityKey>,
    pub derived_performers: HashMap<EntityKey, f64>,
    pub derived_studios: HashMap<EntityKey, f64>,
    pub derived_tags: HashMap<EntityKey, f64>,
    pub implicit_performers: HashMap<String, f64>,
    pub implicit_studios: HashMap<String, f64>,
    pub implicit_tags: HashMap<String, f64>,
    weights: ScoreWeights,
}

/// An overlay rating counts as "highly rated" at or above this.
const EXPLICIT_RATING_THRESHOLD: f64 = 80.0;

impl Preferences {
    pub fn with_weights(weights: ScoreWeights) -> Self {
        Preferences {
            weights,
            ..Default::default()
        }
    }

    pub(crate) fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Builds the full preference state from the user's overlays,
    /// rated/favorited scenes, and precomputed rankings.
    pub async fn build(
        pool: &PgPool,
        user_id: UserId,
        weights: ScoreWeights,
    ) -> Result<Self> {
        let mut prefs = Preferences::with_weights(weights);

        let (explicit, rated_scenes, implicit) = tokio::try_join!(
            sqlx::query(
                "SELECT entity_kind, entity_id, instance_id, favorite, rating \
                 FROM user_entity_overlays \
                 WHERE user_id = $1 \
                   AND entity_kind IN ('performer', 'studio', 'tag') \
                   AND (favorite OR rating >= $2)",
            )
            .bind(user_id)
            .bind(EXPLICIT_RATING_THRESHOLD)
            .fetch_all(pool),
            sqlx::query(
                "SELECT o.entity_id, o.instance_id, o.rating, o.favorite, \
                        s.rating AS upstream_rating, s.studio_id, s.studio_instance_id \
                 FROM user_entity_overlays o \
                 JOIN scenes s ON s.id = o.entity_id \
                  AND (o.instance_id = '' OR s.instance_id = o.instance_id) \
                 WHERE o.user_id = $1 AND o.entity_kind = 'scene' \
                   AND (o.favorite OR o.rating IS NOT NULL)",
            )
            .bind(user_id)
            .fetch_all(pool),
            sqlx::query(
                "SELECT entity_kind, entity_id, engagement_rate, percentile \
                 FROM user_entity_rankings \
                 WHERE user_id = $1 AND percentile >= $2 \
                   AND entity_kind IN ('performer', 'studio', 'tag')",
            )
            .bind(user_id)
            .bind(prefs.weights.implicit_min_percentile)
            .fetch_all(pool),
        )?;

        for row in &explicit {
            prefs.record_explicit(row)?;
        }
        for row in &implicit {
            prefs.record_implicit(row)?;
        }

        prefs.accumulate_rated_scenes(pool, &rated_scenes).await?;

        debug!(
            user = %user_id,
            explicit = explicit.len(),
            derived_scenes = rated_scenes.len(),
            implicit = implicit.len(),
            "preference state built"
        );
        Ok(prefs)
    }

    fn record_explicit(&mut self, row: &PgRow) -> Result<()> {
        let kind: String = row.try_get("entity_kind")?;
        let key = EntityKey::new(
            row.try_get::<String, _>("entity_id")?,
            InstanceId::new(row.try_get::<String, _>("instance_id")?),
        );
        let favorite: bool = row.try_get("favorite")?;
        let rating: Option<f64> = row.try_get("rating")?;
        let highly_rated = rating.is_some_and(|r| r >= EXPLICIT_RATING_THRESHOLD);

        let (favorites, rated) = match kind.as_str() {
            "performer" => (&mut self.favorite_performers, &mut self.rated_performers),
            "studio" => (&mut self.favorite_studios, &mut self.rated_studios),
            "tag" => (&mut self.favorite_tags, &mut self.rated_tags),
            _ => return Ok(()),
        };
        if favorite {
            favorites.insert(key.clone());
        }
        if highly_rated {
            rated.insert(key);
        }
        Ok(())
    }

    fn record_implicit(&mut self, row: &PgRow) -> Result<()> {
        let kind: String = row.try_get("entity_kind")?;
        let id: String = row.try_get("entity_id")?;
        let engagement_rate: f64 = row.try_get("engagement_rate")?;
        let percentile: f64 = row.try_get("percentile")?;
        let weight = engagement_rate * (percentile / 100.0);

        match kind.as_str() {
            "performer" => *self.implicit_performers.entry(id).or_default() += weight,
            "studio" => *self.implicit_studios.entry(id).or_default() += weight,
            "tag" => *self.implicit_tags.entry(id).or_default() += weight,
            _ => {}
        }
        Ok(())
    }

    async fn accumulate_rated_scenes(
        &mut self,
        pool: &PgPool,
        rows: &[PgRow],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let scene_ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("entity_id"))
            .collect::<std::result::Result<_, _>>()?;

        let (performers, tags) = tokio::try_join!(
            sqlx::query(
                "SELECT scene_id, scene_instance_id, performer_id, performer_instance_id \
                 FROM scene_performers WHERE scene_id = ANY($1)",
            )
            .bind(&scene_ids)
            .fetch_all(pool),
            sqlx::query(
                "SELECT scene_id, scene_instance_id, tag_id, tag_instance_id \
                 FROM scene_tags WHERE scene_id = ANY($1)",
            )
            .bind(&scene_ids)
            .fetch_all(pool),
        )?;

        let performer_links = junction_pairs(&performers, "performer_id", "performer_instance_id")?;
        let tag_links = junction_pairs(&tags, "tag_id", "tag_instance_id")?;

        for row in rows {
            let scene_key = EntityKey::new(
                row.try_get::<String, _>("entity_id")?,
                InstanceId::new(row.try_get::<String, _>("instance_id")?),
            );
            let studio_key = row
                .try_get::<Option<String>, _>("studio_id")?
                .map(|id| {
                    let instance: Option<String> = row.try_get("studio_instance_id")?;
                    Ok::<_, sqlx::Error>(EntityKey::new(
                        id,
                        InstanceId::new(instance.unwrap_or_default()),
                    ))
                })
                .transpose()?;

            let scene = Scene {
                key: scene_key.clone(),
                studio_key,
                performers: related_for(&scene_key, &performer_links)
                    .map(|key| Performer {
                        key,
                        ..Default::default()
                    })
                    .collect(),
                tags: related_for(&scene_key, &tag_links)
                    .map(|key| Tag {
                        key,
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            };

            self.accumulate_scene(
                row.try_get("rating")?,
                row.try_get("upstream_rating")?,
                row.try_get("favorite")?,
                &scene,
            );
        }
        Ok(())
    }

    /// Propagates one rated/favorited scene's weight multiplier to its
    /// performers, studio, and direct tags. Scenes under the rating
    /// floor contribute nothing.
    pub fn accumulate_scene(
        &mut self,
        user_rating: Option<f64>,
        upstream_rating: Option<f64>,
        favorite: bool,
        scene: &Scene,
    ) {
        let Some(multiplier) =
            scene_multiplier(&self.weights, user_rating, upstream_rating, favorite)
        else {
            return;
        };

        for performer in &scene.performers {
            *self
                .derived_performers
                .entry(performer.key.clone())
                .or_default() += multiplier;
        }
        if let Some(studio_key) = scene
            .studio
            .as_ref()
            .map(|s| &s.key)
            .or(scene.studio_key.as_ref())
        {
            *self.derived_studios.entry(studio_key.clone()).or_default() += multiplier;
        }
        for tag in &scene.tags {
            *self.derived_tags.entry(tag.key.clone()).or_default() += multiplier;
        }
    }

    pub(crate) fn is_favorite_performer(&self, key: &EntityKey) -> bool {
        set_contains(&self.favorite_performers, key)
    }

    pub(crate) fn is_rated_performer(&self, key: &EntityKey) -> bool {
        set_contains(&self.rated_performers, key)
    }

    pub(crate) fn is_favorite_studio(&self, key: &EntityKey) -> bool {
        set_contains(&self.favorite_studios, key)
    }

    pub(crate) fn is_rated_studio(&self, key: &EntityKey) -> bool {
        set_contains(&self.rated_studios, key)
    }

    pub(crate) fn is_favorite_tag(&self, key: &EntityKey) -> bool {
        set_contains(&self.favorite_tags, key)
    }

    pub(crate) fn is_rated_tag(&self, key: &EntityKey) -> bool {
        set_contains(&self.rated_tags, key)
    }

    pub(crate) fn derived_performer_weight(&self, key: &EntityKey) -> f64 {
        map_weight(&self.derived_performers, key)
    }

    pub(crate) fn derived_studio_weight(&self, key: &EntityKey) -> f64 {
        map_weight(&self.derived_studios, key)
    }

    pub(crate) fn derived_tag_weight(&self, key: &EntityKey) -> f64 {
        map_weight(&self.derived_tags, key)
    }

    pub(crate) fn implicit_performer_weight(&self, id: &str) -> f64 {
        self.implicit_performers.get(id).copied().unwrap_or(0.0)
    }

    pub(crate) fn implicit_studio_weight(&self, id: &str) -> f64 {
        self.implicit_studios.get(id).copied().unwrap_or(0.0)
    }

    pub(crate) fn implicit_tag_weight(&self, id: &str) -> f64 {
        self.implicit_tags.get(id).copied().unwrap_or(0.0)
    }
}

/// Membership honoring the legacy sentinel on either side.
fn set_contains(set: &HashSet<EntityKey>, key: &EntityKey) -> bool {
    if set.contains(key) {
        return true;
    }
    if !key.instance.is_legacy() && set.contains(&EntityKey::legacy(key.id.clone())) {
        return true;
    }
    if key.instance.is_legacy() {
        return set.iter().any(|k| k.id == key.id);
    }
    false
}

fn map_weight(map: &HashMap<EntityKey, f64>, key: &EntityKey) -> f64 {
    map.iter()
        .filter(|(k, _)| k.matches(key))
        .map(|(_, weight)| *weight)
        .sum()
}

fn junction_pairs(
    rows: &[PgRow],
    related_id: &str,
    related_instance: &str,
) -> Result<Vec<(EntityKey, EntityKey)>> {
    rows.iter()
        .map(|row| {
            let owner = EntityKey::new(
                row.try_get::<String, _>(0)?,
                InstanceId::new(row.try_get::<String, _>(1)?),
            );
            let related = EntityKey::new(
                row.try_get::<String, _>(related_id)?,
                InstanceId::new(row.try_get::<String, _>(related_instance)?),
            );
            Ok((owner, related))
        })
        .collect()
}

fn related_for<'a>(
    key: &'a EntityKey,
    links: &'a [(EntityKey, EntityKey)],
) -> impl Iterator<Item = EntityKey> + 'a {
    links
        .iter()
        .filter(move |(owner, _)| owner.matches(key))
        .map(|(_, related)| related.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_membership_works_both_directions() {
        let mut set = HashSet::new();
        set.insert(EntityKey::legacy("1"));
        set.insert(EntityKey::new("2", "alpha"));

        assert!(set_contains(&set, &EntityKey::new("1", "beta")));
        assert!(set_contains(&set, &EntityKey::legacy("2")));
        assert!(!set_contains(&set, &EntityKey::new("2", "beta")));
        assert!(!set_contains(&set, &EntityKey::new("3", "alpha")));
    }

    #[test]
    fn derived_weights_accumulate_across_scenes() {
        let mut prefs = Preferences::with_weights(ScoreWeights::default());
        let performer = EntityKey::new("p1", "alpha");
        let scene = Scene {
            key: EntityKey::new("s1", "alpha"),
            performers: vec![Performer {
                key: performer.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        prefs.accumulate_scene(Some(80.0), None, false, &scene);
        prefs.accumulate_scene(Some(100.0), None, false, &scene);

        let expected = 0.8 * 2.0 + 1.0 * 2.0;
        assert!((prefs.derived_performer_weight(&performer) - expected).abs() < 1e-9);
    }

    #[test]
    fn below_floor_scenes_contribute_nothing() {
        let mut prefs = Preferences::with_weights(ScoreWeights::default());
        let scene = Scene {
            key: EntityKey::new("s1", "alpha"),
            performers: vec![Performer {
                key: EntityKey::new("p1", "alpha"),
                ..Default::default()
            }],
            ..Default::default()
        };
        prefs.accumulate_scene(Some(30.0), None, false, &scene);
        assert!(prefs.derived_performers.is_empty());
    }
}
