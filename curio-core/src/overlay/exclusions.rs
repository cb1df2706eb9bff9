//! Exclusion overlay: per-user hidden entities.
//!
//! Hiding is stored as rows in `user_excluded_entities`. A row with the
//! legacy sentinel instance hides the entity globally; an instance-scoped
//! row hides that copy only. Hiding a performer, studio, or tag also
//! derives scene exclusions for every scene that features it; derived
//! rows carry a `derived_from` token so they can be removed when the
//! source exclusion is lifted.
//!
//! An in-memory per-user set backs the hot `is_excluded` path. The cache
//! is invalidated explicitly on every mutation, never by TTL, so a hide
//! is visible to the next read.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use curio_model::{EntityKey, EntityKind, UserId};

use crate::error::Result;

/// One exclusion row: kind, id, and the hiding scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exclusion {
    pub kind: EntityKind,
    pub id: String,
    pub instance: String,
}

/// Snapshot of a user's exclusions, cheap to share across requests.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    rows: HashSet<Exclusion>,
}

impl ExclusionSet {
    pub fn from_rows(rows: impl IntoIterator<Item = Exclusion>) -> Self {
        ExclusionSet {
            rows: rows.into_iter().collect(),
        }
    }

    /// Whether `key` is hidden: an exact instance match or a global row.
    pub fn matches(&self, kind: EntityKind, key: &EntityKey) -> bool {
        self.rows.contains(&Exclusion {
            kind,
            id: key.id.clone(),
            instance: key.instance.as_str().to_string(),
        }) || self.rows.contains(&Exclusion {
            kind,
            id: key.id.clone(),
            instance: String::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn derived_token(kind: EntityKind, key: &EntityKey) -> String {
    format!("{}:{}", kind.as_str(), key)
}

#[derive(Debug)]
pub struct ExclusionOverlay {
    pool: PgPool,
    cache: DashMap<UserId, Arc<ExclusionSet>>,
}

impl ExclusionOverlay {
    pub fn new(pool: PgPool) -> Self {
        ExclusionOverlay {
            pool,
            cache: DashMap::new(),
        }
    }

    /// Loads (or returns the cached) exclusion set for a user.
    pub async fn for_user(&self, user_id: UserId) -> Result<Arc<ExclusionSet>> {
        if let Some(set) = self.cache.get(&user_id) {
            return Ok(Arc::clone(&set));
        }
        let rows = sqlx::query(
            "SELECT entity_kind, entity_id, instance_id \
             FROM user_excluded_entities WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut set = HashSet::with_capacity(rows.len());
        for row in rows {
            let kind = EntityKind::parse(&row.get::<String, _>("entity_kind"))?;
            set.insert(Exclusion {
                kind,
                id: row.get("entity_id"),
                instance: row.get("instance_id"),
            });
        }
        let set = Arc::new(ExclusionSet::from_rows(set));
        self.cache.insert(user_id, Arc::clone(&set));
        Ok(set)
    }

    /// Anonymous callers (`None`) have nothing excluded.
    pub async fn is_excluded(
        &self,
        user_id: Option<UserId>,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<bool> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        Ok(self.for_user(user_id).await?.matches(kind, key))
    }

    /// Drops excluded entries from a batch, keeping order. Anonymous
    /// callers get the batch back untouched.
    pub async fn filter_excluded<T>(
        &self,
        user_id: Option<UserId>,
        kind: EntityKind,
        items: Vec<T>,
        key_of: impl Fn(&T) -> &EntityKey,
    ) -> Result<Vec<T>> {
        let Some(user_id) = user_id else {
            return Ok(items);
        };
        let set = self.for_user(user_id).await?;
        if set.is_empty() {
            return Ok(items);
        }
        Ok(items
            .into_iter()
            .filter(|item| !set.matches(kind, key_of(item)))
            .collect())
    }

    /// Hides an entity. A legacy-sentinel key hides it on every
    /// instance; a composite key hides that instance's copy only.
    /// Hiding a performer, studio, or tag cascades derived scene
    /// exclusions in the same transaction.
    pub async fn hide(
        &self,
        user_id: UserId,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_excluded_entities \
             (user_id, entity_kind, entity_id, instance_id) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&key.id)
        .bind(key.instance.as_str())
        .execute(&mut *tx)
        .await?;

        let derived = match kind {
            EntityKind::Performer => {
                derive_from_performer(&mut tx, user_id, key).await?
            }
            EntityKind::Studio => derive_from_studio(&mut tx, user_id, key).await?,
            EntityKind::Tag => derive_from_tag(&mut tx, user_id, key).await?,
            _ => 0,
        };

        tx.commit().await?;
        self.invalidate(user_id);
        info!(
            user = %user_id,
            kind = kind.as_str(),
            entity = %key,
            derived_scenes = derived,
            "entity hidden"
        );
        Ok(())
    }

    /// Lifts one exclusion and any scene exclusions derived from it.
    pub async fn unhide(
        &self,
        user_id: UserId,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM user_excluded_entities \
             WHERE user_id = $1 AND entity_kind = $2 \
             AND entity_id = $3 AND instance_id = $4",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&key.id)
        .bind(key.instance.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM user_excluded_entities \
             WHERE user_id = $1 AND derived_from = $2",
        )
        .bind(user_id)
        .bind(derived_token(kind, key))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.invalidate(user_id);
        debug!(user = %user_id, kind = kind.as_str(), entity = %key, "entity unhidden");
        Ok(())
    }

    /// Clears every exclusion the user holds, direct and derived.
    pub async fn unhide_all(&self, user_id: UserId) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM user_excluded_entities WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        self.invalidate(user_id);
        info!(user = %user_id, removed = result.rows_affected(), "all exclusions cleared");
        Ok(result.rows_affected())
    }

    /// Rebuilds a user's derived scene exclusions from their direct
    /// performer/studio/tag exclusions. Run after a catalog refresh so
    /// newly synced scenes featuring hidden entities get covered.
    pub async fn recompute_user(&self, user_id: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM user_excluded_entities \
             WHERE user_id = $1 AND derived_from IS NOT NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        // Re-derive set-wise from the surviving direct exclusions.
        sqlx::query(
            "INSERT INTO user_excluded_entities \
             (user_id, entity_kind, entity_id, instance_id, derived_from) \
             SELECT x.user_id, 'scene', sp.scene_id, sp.scene_instance_id, \
                    'performer:' || x.entity_id || '@' || x.instance_id \
             FROM user_excluded_entities x \
             JOIN scene_performers sp ON sp.performer_id = x.entity_id \
              AND (x.instance_id = '' OR sp.performer_instance_id = '' \
                   OR sp.performer_instance_id = x.instance_id) \
             WHERE x.user_id = $1 AND x.entity_kind = 'performer' \
               AND x.derived_from IS NULL \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_excluded_entities \
             (user_id, entity_kind, entity_id, instance_id, derived_from) \
             SELECT x.user_id, 'scene', s.id, s.instance_id, \
                    'studio:' || x.entity_id || '@' || x.instance_id \
             FROM user_excluded_entities x \
             JOIN scenes s ON s.studio_id = x.entity_id \
              AND (x.instance_id = '' OR s.studio_instance_id = '' \
                   OR s.studio_instance_id = x.instance_id) \
             WHERE x.user_id = $1 AND x.entity_kind = 'studio' \
               AND x.derived_from IS NULL \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_excluded_entities \
             (user_id, entity_kind, entity_id, instance_id, derived_from) \
             SELECT x.user_id, 'scene', st.scene_id, st.scene_instance_id, \
                    'tag:' || x.entity_id || '@' || x.instance_id \
             FROM user_excluded_entities x \
             JOIN scene_tags st ON st.tag_id = x.entity_id \
              AND (x.instance_id = '' OR st.tag_instance_id = '' \
                   OR st.tag_instance_id = x.instance_id) \
             WHERE x.user_id = $1 AND x.entity_kind = 'tag' \
               AND x.derived_from IS NULL \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        // Tags inherited through performers, studio, or groups count too.
        sqlx::query(
            "INSERT INTO user_excluded_entities \
             (user_id, entity_kind, entity_id, instance_id, derived_from) \
             SELECT x.user_id, 'scene', s.id, s.instance_id, \
                    'tag:' || x.entity_id || '@' || x.instance_id \
             FROM user_excluded_entities x \
             JOIN scenes s ON x.entity_id = ANY(s.inherited_tag_ids) \
             WHERE x.user_id = $1 AND x.entity_kind = 'tag' \
               AND x.derived_from IS NULL \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.invalidate(user_id);
        Ok(())
    }

    /// Recomputes every user with stored exclusions. One user failing
    /// does not abort the rest.
    pub async fn recompute_all_users(&self) -> Result<usize> {
        let user_ids: Vec<UserId> = sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM user_excluded_entities",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut succeeded = 0usize;
        for user_id in user_ids {
            match self.recompute_user(user_id).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(user = %user_id, error = %e, "exclusion recompute failed; continuing");
                }
            }
        }
        Ok(succeeded)
    }

    pub fn invalidate(&self, user_id: UserId) {
        self.cache.remove(&user_id);
    }
}

async fn derive_from_performer(
    tx: &mut sqlx::PgTransaction<'_>,
    user_id: UserId,
    key: &EntityKey,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO user_excluded_entities \
         (user_id, entity_kind, entity_id, instance_id, derived_from) \
         SELECT $1, 'scene', sp.scene_id, sp.scene_instance_id, $4 \
         FROM scene_performers sp \
         WHERE sp.performer_id = $2 \
           AND ($3 = '' OR sp.performer_instance_id = '' \
                OR sp.performer_instance_id = $3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(&key.id)
    .bind(key.instance.as_str())
    .bind(derived_token(EntityKind::Performer, key))
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn derive_from_studio(
    tx: &mut sqlx::PgTransaction<'_>,
    user_id: UserId,
    key: &EntityKey,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO user_excluded_entities \
         (user_id, entity_kind, entity_id, instance_id, derived_from) \
         SELECT $1, 'scene', s.id, s.instance_id, $4 \
         FROM scenes s \
         WHERE s.studio_id = $2 \
           AND ($3 = '' OR s.studio_instance_id = '' OR s.studio_instance_id = $3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(&key.id)
    .bind(key.instance.as_str())
    .bind(derived_token(EntityKind::Studio, key))
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn derive_from_tag(
    tx: &mut sqlx::PgTransaction<'_>,
    user_id: UserId,
    key: &EntityKey,
) -> Result<u64> {
    let direct = sqlx::query(
        "INSERT INTO user_excluded_entities \
         (user_id, entity_kind, entity_id, instance_id, derived_from) \
         SELECT $1, 'scene', st.scene_id, st.scene_instance_id, $4 \
         FROM scene_tags st \
         WHERE st.tag_id = $2 \
           AND ($3 = '' OR st.tag_instance_id = '' OR st.tag_instance_id = $3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(&key.id)
    .bind(key.instance.as_str())
    .bind(derived_token(EntityKind::Tag, key))
    .execute(&mut **tx)
    .await?;

    let inherited = sqlx::query(
        "INSERT INTO user_excluded_entities \
         (user_id, entity_kind, entity_id, instance_id, derived_from) \
         SELECT $1, 'scene', s.id, s.instance_id, $3 \
         FROM scenes s WHERE $2 = ANY(s.inherited_tag_ids) \
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(&key.id)
    .bind(derived_token(EntityKind::Tag, key))
    .execute(&mut **tx)
    .await?;

    Ok(direct.rows_affected() + inherited.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusion(kind: EntityKind, id: &str, instance: &str) -> Exclusion {
        Exclusion {
            kind,
            id: id.to_string(),
            instance: instance.to_string(),
        }
    }

    #[test]
    fn scoped_exclusion_hides_one_instance_only() {
        let set = ExclusionSet::from_rows(vec![exclusion(
            EntityKind::Scene,
            "42",
            "alpha",
        )]);
        assert!(set.matches(EntityKind::Scene, &EntityKey::new("42", "alpha")));
        assert!(!set.matches(EntityKind::Scene, &EntityKey::new("42", "beta")));
        assert!(!set.matches(EntityKind::Performer, &EntityKey::new("42", "alpha")));
    }

    #[test]
    fn global_exclusion_hides_every_instance() {
        let set =
            ExclusionSet::from_rows(vec![exclusion(EntityKind::Scene, "42", "")]);
        assert!(set.matches(EntityKind::Scene, &EntityKey::new("42", "alpha")));
        assert!(set.matches(EntityKind::Scene, &EntityKey::new("42", "beta")));
        assert!(set.matches(EntityKind::Scene, &EntityKey::legacy("42")));
    }

    #[tokio::test]
    async fn anonymous_callers_have_nothing_excluded() {
        // Never queried: the anonymous path resolves before touching the pool.
        let pool = PgPool::connect_lazy("postgres://localhost/unreachable").unwrap();
        let overlay = ExclusionOverlay::new(pool);
        let key = EntityKey::new("42", "alpha");
        assert!(!overlay
            .is_excluded(None, EntityKind::Scene, &key)
            .await
            .unwrap());
        let kept = overlay
            .filter_excluded(None, EntityKind::Scene, vec![key.clone()], |k| k)
            .await
            .unwrap();
        assert_eq!(kept, vec![key]);
    }

    #[test]
    fn derived_tokens_name_the_source_exclusion() {
        let key = EntityKey::new("7", "alpha");
        assert_eq!(derived_token(EntityKind::Performer, &key), "performer:7@alpha");
        assert_eq!(
            derived_token(EntityKind::Tag, &EntityKey::legacy("9")),
            "tag:9@"
        );
    }
}
