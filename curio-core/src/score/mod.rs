//! Recommendation scoring.
//!
//! A score sums per-category contributions from a user's preference
//! state. Every category is square-root scaled before its coefficient is
//! applied, so additional matching signals of the same category have
//! diminishing returns: five favorited performers in one scene score
//! well under five times one favorited performer.

mod preferences;

pub use preferences::Preferences;

use std::collections::HashSet;

use serde::Deserialize;

use curio_model::{EntityKey, Scene};

/// Rating assumed for a scene the user favorited but never rated.
pub const IMPLICIT_FAVORITE_RATING: f64 = 75.0;

/// Category coefficients. The defaults keep the intended ordering:
/// performer favorites over studio favorites over studio ratings, and
/// direct scene tags over tags reached through a performer or studio.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub performer_favorite: f64,
    pub performer_rated: f64,
    pub performer_derived: f64,
    pub performer_implicit: f64,
    pub studio_favorite: f64,
    pub studio_rated: f64,
    pub studio_derived: f64,
    pub studio_implicit: f64,
    pub scene_tag_favorite: f64,
    pub scene_tag_rated: f64,
    pub scene_tag_derived: f64,
    pub scene_tag_implicit: f64,
    pub related_tag_favorite: f64,
    pub related_tag_rated: f64,
    pub related_tag_derived: f64,
    /// Base of the derived-weight multiplier; a perfect rating maps to
    /// exactly this weight before the favorite bonus.
    pub derived_base: f64,
    pub derived_favorite_bonus: f64,
    /// Scenes whose effective rating falls below this contribute nothing
    /// to derived weights.
    pub rating_floor: f64,
    /// Implicit signals below this percentile are noise and ignored.
    pub implicit_min_percentile: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            performer_favorite: 6.0,
            performer_rated: 3.0,
            performer_derived: 2.0,
            performer_implicit: 1.5,
            studio_favorite: 4.0,
            studio_rated: 2.0,
            studio_derived: 1.5,
            studio_implicit: 1.0,
            scene_tag_favorite: 3.0,
            scene_tag_rated: 1.5,
            scene_tag_derived: 1.0,
            scene_tag_implicit: 0.75,
            related_tag_favorite: 1.5,
            related_tag_rated: 0.75,
            related_tag_derived: 0.5,
            derived_base: 2.0,
            derived_favorite_bonus: 1.0,
            rating_floor: 60.0,
            implicit_min_percentile: 50.0,
        }
    }
}

/// The one rating fallback rule: explicit user rating, else the
/// upstream-supplied rating, else an assumed rating when favorited, else
/// no rating at all.
pub fn effective_rating(
    user_rating: Option<f64>,
    upstream_rating: Option<f64>,
    favorite: bool,
) -> Option<f64> {
    user_rating
        .or(upstream_rating)
        .or(if favorite { Some(IMPLICIT_FAVORITE_RATING) } else { None })
}

/// Weight a rated/favorited scene contributes to each related entity.
/// `None` when the scene falls below the rating floor.
pub fn scene_multiplier(
    weights: &ScoreWeights,
    user_rating: Option<f64>,
    upstream_rating: Option<f64>,
    favorite: bool,
) -> Option<f64> {
    let rating = effective_rating(user_rating, upstream_rating, favorite)?;
    if rating < weights.rating_floor {
        return None;
    }
    let mut multiplier = (rating / 100.0) * weights.derived_base;
    if favorite {
        multiplier += weights.derived_favorite_bonus;
    }
    Some(multiplier)
}

fn sqrt_scaled(value: f64) -> f64 {
    if value <= 0.0 {
        0.0
    } else {
        value.sqrt()
    }
}

impl Preferences {
    /// Scores a hydrated scene. Requires performers, studio, and tags to
    /// be attached; missing relations simply contribute nothing.
    pub fn score(&self, scene: &Scene) -> f64 {
        let w = self.weights();
        let mut score = 0.0;

        // Performers.
        let fav = scene
            .performers
            .iter()
            .filter(|p| self.is_favorite_performer(&p.key))
            .count() as f64;
        let rated = scene
            .performers
            .iter()
            .filter(|p| !self.is_favorite_performer(&p.key) && self.is_rated_performer(&p.key))
            .count() as f64;
        let derived: f64 = scene
            .performers
            .iter()
            .map(|p| self.derived_performer_weight(&p.key))
            .sum();
        let implicit: f64 = scene
            .performers
            .iter()
            .map(|p| self.implicit_performer_weight(&p.key.id))
            .sum();
        score += w.performer_favorite * sqrt_scaled(fav)
            + w.performer_rated * sqrt_scaled(rated)
            + w.performer_derived * sqrt_scaled(derived)
            + w.performer_implicit * sqrt_scaled(implicit);

        // Studio.
        if let Some(studio_key) = scene
            .studio
            .as_ref()
            .map(|s| &s.key)
            .or(scene.studio_key.as_ref())
        {
            if self.is_favorite_studio(studio_key) {
                score += w.studio_favorite;
            } else if self.is_rated_studio(studio_key) {
                score += w.studio_rated;
            }
            score += w.studio_derived
                * sqrt_scaled(self.derived_studio_weight(studio_key))
                + w.studio_implicit
                    * sqrt_scaled(self.implicit_studio_weight(&studio_key.id));
        }

        // Tags, most-specific source first: a tag counted at scene level
        // never counts again as a performer- or studio-inherited tag.
        let direct_ids: HashSet<&str> =
            scene.tags.iter().map(|t| t.key.id.as_str()).collect();
        score += self.tag_contribution(
            scene.tags.iter().map(|t| &t.key),
            w.scene_tag_favorite,
            w.scene_tag_rated,
            w.scene_tag_derived,
            Some(w.scene_tag_implicit),
        );

        let mut related_seen: HashSet<&str> = HashSet::new();
        let related_tags: Vec<&EntityKey> = scene
            .performers
            .iter()
            .flat_map(|p| p.tags.iter())
            .chain(scene.studio.iter().flat_map(|s| s.tags.iter()))
            .map(|t| &t.key)
            .filter(|k| !direct_ids.contains(k.id.as_str()))
            .filter(|k| related_seen.insert(k.id.as_str()))
            .collect();
        score += self.tag_contribution(
            related_tags.into_iter(),
            w.related_tag_favorite,
            w.related_tag_rated,
            w.related_tag_derived,
            None,
        );

        score
    }

    /// Flat variant for batch scoring: bare key lists, every tag treated
    /// at scene-tag weight, no source attribution.
    pub fn score_flat(
        &self,
        performers: &[EntityKey],
        studio: Option<&EntityKey>,
        tags: &[EntityKey],
    ) -> f64 {
        let w = self.weights();
        let mut score = 0.0;

        let fav = performers
            .iter()
            .filter(|k| self.is_favorite_performer(k))
            .count() as f64;
        let rated = performers
            .iter()
            .filter(|k| !self.is_favorite_performer(k) && self.is_rated_performer(k))
            .count() as f64;
        let derived: f64 = performers
            .iter()
            .map(|k| self.derived_performer_weight(k))
            .sum();
        let implicit: f64 = performers
            .iter()
            .map(|k| self.implicit_performer_weight(&k.id))
            .sum();
        score += w.performer_favorite * sqrt_scaled(fav)
            + w.performer_rated * sqrt_scaled(rated)
            + w.performer_derived * sqrt_scaled(derived)
            + w.performer_implicit * sqrt_scaled(implicit);

        if let Some(studio_key) = studio {
            if self.is_favorite_studio(studio_key) {
                score += w.studio_favorite;
            } else if self.is_rated_studio(studio_key) {
                score += w.studio_rated;
            }
            score += w.studio_derived
                * sqrt_scaled(self.derived_studio_weight(studio_key))
                + w.studio_implicit
                    * sqrt_scaled(self.implicit_studio_weight(&studio_key.id));
        }

        score += self.tag_contribution(
            tags.iter(),
            w.scene_tag_favorite,
            w.scene_tag_rated,
            w.scene_tag_derived,
            Some(w.scene_tag_implicit),
        );

        score
    }

    fn tag_contribution<'k>(
        &self,
        tags: impl Iterator<Item = &'k EntityKey>,
        favorite_coeff: f64,
        rated_coeff: f64,
        derived_coeff: f64,
        implicit_coeff: Option<f64>,
    ) -> f64 {
        let mut fav = 0.0;
        let mut rated = 0.0;
        let mut derived = 0.0;
        let mut implicit = 0.0;
        for key in tags {
            if self.is_favorite_tag(key) {
                fav += 1.0;
            } else if self.is_rated_tag(key) {
                rated += 1.0;
            }
            derived += self.derived_tag_weight(key);
            implicit += self.implicit_tag_weight(&key.id);
        }
        favorite_coeff * sqrt_scaled(fav)
            + rated_coeff * sqrt_scaled(rated)
            + derived_coeff * sqrt_scaled(derived)
            + implicit_coeff.unwrap_or(0.0) * sqrt_scaled(implicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_model::{Performer, Studio, Tag};

    fn key(id: &str) -> EntityKey {
        EntityKey::new(id, "alpha")
    }

    fn tag(id: &str) -> Tag {
        Tag {
            key: key(id),
            name: id.to_string(),
            ..Default::default()
        }
    }

    fn scene_with(performer_tags: Vec<Tag>) -> Scene {
        Scene {
            key: key("s1"),
            performers: vec![Performer {
                key: key("p1"),
                name: "P".to_string(),
                tags: performer_tags,
                ..Default::default()
            }],
            studio: Some(Studio {
                key: key("st1"),
                name: "S".to_string(),
                ..Default::default()
            }),
            tags: vec![tag("t1")],
            ..Default::default()
        }
    }

    #[test]
    fn default_weights_keep_the_coefficient_ordering() {
        let w = ScoreWeights::default();
        assert!(w.performer_favorite > w.studio_favorite);
        assert!(w.studio_favorite > w.studio_rated);
        assert!(w.scene_tag_favorite > w.related_tag_favorite);
        assert!(w.scene_tag_rated > w.related_tag_rated);
        assert!(w.scene_tag_derived > w.related_tag_derived);
    }

    #[test]
    fn effective_rating_falls_back_in_order() {
        assert_eq!(effective_rating(Some(90.0), Some(50.0), true), Some(90.0));
        assert_eq!(effective_rating(None, Some(50.0), true), Some(50.0));
        assert_eq!(
            effective_rating(None, None, true),
            Some(IMPLICIT_FAVORITE_RATING)
        );
        assert_eq!(effective_rating(None, None, false), None);
    }

    #[test]
    fn multiplier_skips_scenes_below_the_floor() {
        let w = ScoreWeights::default();
        assert_eq!(scene_multiplier(&w, Some(40.0), None, false), None);
        assert!(scene_multiplier(&w, Some(85.0), None, false).unwrap() > 0.0);
    }

    #[test]
    fn favoriting_a_scene_raises_its_derived_multiplier() {
        let w = ScoreWeights::default();
        let plain = scene_multiplier(&w, Some(85.0), None, false).unwrap();
        let favorited = scene_multiplier(&w, Some(85.0), None, true).unwrap();
        assert!(favorited > plain);
    }

    #[test]
    fn diminishing_returns_across_same_category_signals() {
        let mut prefs = Preferences::with_weights(ScoreWeights::default());
        for i in 0..5 {
            prefs.favorite_performers.insert(key(&format!("p{i}")));
        }

        let one = prefs.score_flat(&[key("p0")], None, &[]);
        let five = prefs.score_flat(
            &[key("p0"), key("p1"), key("p2"), key("p3"), key("p4")],
            None,
            &[],
        );
        assert!(five > one);
        assert!(five < 5.0 * one);
        assert!((five - one * 5.0_f64.sqrt()).abs() < 1e-9);
    }

    /// A scene carrying a favorite flag must outscore the identical
    /// scene without it through the derived weights it propagates.
    #[test]
    fn scene_favorite_lifts_the_score() {
        let scene = scene_with(Vec::new());

        let mut favorited = Preferences::with_weights(ScoreWeights::default());
        favorited.accumulate_scene(Some(85.0), None, true, &scene);
        let mut plain = Preferences::with_weights(ScoreWeights::default());
        plain.accumulate_scene(Some(85.0), None, false, &scene);

        assert!(favorited.score(&scene) > plain.score(&scene));
    }

    /// A tag counted as a direct scene tag must not also count through a
    /// performer's tag list.
    #[test]
    fn direct_scene_tags_are_not_double_counted() {
        let mut prefs = Preferences::with_weights(ScoreWeights::default());
        prefs.favorite_tags.insert(key("t1"));
        prefs.favorite_performers.insert(key("p1"));

        let with_overlap = scene_with(vec![tag("t1")]);
        let without_overlap = scene_with(Vec::new());

        assert_eq!(
            prefs.score(&with_overlap),
            prefs.score(&without_overlap)
        );
    }

    #[test]
    fn unrelated_entities_score_zero() {
        let prefs = Preferences::with_weights(ScoreWeights::default());
        assert_eq!(prefs.score(&scene_with(Vec::new())), 0.0);
    }

    #[test]
    fn legacy_preference_keys_match_any_instance() {
        let mut prefs = Preferences::with_weights(ScoreWeights::default());
        prefs.favorite_performers.insert(EntityKey::legacy("p1"));
        let score = prefs.score_flat(&[key("p1")], None, &[]);
        assert!(score > 0.0);
    }
}
