//! Cross-instance deduplication.
//!
//! Entities synced from different instances that share an external
//! registry id are the same logical content. Grouping happens in memory
//! after one scan of the ids; each group elects a primary by configured
//! instance priority, and callers can rewrite arbitrary keys to their
//! group's canonical primary.

use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tracing::debug;

use curio_model::{EntityKey, EntityKind, InstanceId};

use crate::error::Result;
use crate::instances::InstanceRegistry;

/// One set of same-content entities across instances.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub external_id: String,
    /// Member with the best (lowest) instance priority.
    pub primary: EntityKey,
    /// Remaining members, priority order.
    pub duplicates: Vec<EntityKey>,
}

#[derive(Debug)]
pub struct DedupResolver<'a> {
    pool: &'a PgPool,
    registry: &'a InstanceRegistry,
}

impl<'a> DedupResolver<'a> {
    pub fn new(pool: &'a PgPool, registry: &'a InstanceRegistry) -> Self {
        DedupResolver { pool, registry }
    }

    /// Finds every external id carried by entities on more than one
    /// instance. Single-member groups are not duplicates and are never
    /// reported.
    pub async fn find_duplicates(&self, kind: EntityKind) -> Result<Vec<DuplicateGroup>> {
        let sql = format!(
            "SELECT id, instance_id, external_id FROM {table} \
             WHERE external_id IS NOT NULL AND external_id <> ''",
            table = kind.table()
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool).await?;

        let mut by_external: HashMap<String, Vec<EntityKey>> = HashMap::new();
        for row in rows {
            let key = EntityKey::new(
                row.get::<String, _>("id"),
                InstanceId::new(row.get::<String, _>("instance_id")),
            );
            by_external
                .entry(row.get("external_id"))
                .or_default()
                .push(key);
        }

        let mut groups: Vec<DuplicateGroup> = by_external
            .into_iter()
            .filter_map(|(external_id, members)| {
                group_members(external_id, members, self.registry)
            })
            .collect();
        groups.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        debug!(kind = kind.as_str(), groups = groups.len(), "duplicate scan complete");
        Ok(groups)
    }

    /// Key-to-primary mapping over every duplicate group of a kind.
    pub async fn build_canonical_mapping(
        &self,
        kind: EntityKind,
    ) -> Result<HashMap<EntityKey, EntityKey>> {
        let groups = self.find_duplicates(kind).await?;
        Ok(canonical_mapping(&groups))
    }
}

/// Orders members by instance priority (key as tie-break) and splits off
/// the primary. Groups spanning a single instance are not duplicates.
fn group_members(
    external_id: String,
    mut members: Vec<EntityKey>,
    registry: &InstanceRegistry,
) -> Option<DuplicateGroup> {
    let mut instances: Vec<&InstanceId> = members.iter().map(|k| &k.instance).collect();
    instances.sort();
    instances.dedup();
    if instances.len() < 2 {
        return None;
    }

    members.sort_by(|a, b| {
        registry
            .priority(&a.instance)
            .cmp(&registry.priority(&b.instance))
            .then_with(|| a.cmp(b))
    });
    let primary = members.remove(0);
    Some(DuplicateGroup {
        external_id,
        primary,
        duplicates: members,
    })
}

fn canonical_mapping(groups: &[DuplicateGroup]) -> HashMap<EntityKey, EntityKey> {
    let mut mapping = HashMap::new();
    for group in groups {
        for duplicate in &group.duplicates {
            mapping.insert(duplicate.clone(), group.primary.clone());
        }
    }
    mapping
}

/// Rewrites a key to its group primary. Keys outside any group, and the
/// primaries themselves, pass through unchanged, so applying the mapping
/// twice is the same as applying it once.
pub fn resolve_to_canonical(
    mapping: &HashMap<EntityKey, EntityKey>,
    key: &EntityKey,
) -> EntityKey {
    mapping.get(key).cloned().unwrap_or_else(|| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstanceSettings;

    fn registry() -> InstanceRegistry {
        let instance = |id: &str, priority| InstanceSettings {
            id: id.to_string(),
            base_url: format!("https://{id}.example"),
            api_key: None,
            priority,
            enabled: true,
        };
        InstanceRegistry::new(&[instance("alpha", 1), instance("beta", 2)])
    }

    #[test]
    fn primary_follows_instance_priority() {
        let group = group_members(
            "ext-1".to_string(),
            vec![EntityKey::new("b1", "beta"), EntityKey::new("a1", "alpha")],
            &registry(),
        )
        .unwrap();
        assert_eq!(group.primary, EntityKey::new("a1", "alpha"));
        assert_eq!(group.duplicates, vec![EntityKey::new("b1", "beta")]);
    }

    #[test]
    fn single_instance_repeats_are_not_duplicates() {
        assert!(group_members(
            "ext-1".to_string(),
            vec![EntityKey::new("a1", "alpha"), EntityKey::new("a2", "alpha")],
            &registry(),
        )
        .is_none());
        assert!(group_members(
            "ext-2".to_string(),
            vec![EntityKey::new("a1", "alpha")],
            &registry(),
        )
        .is_none());
    }

    #[test]
    fn unknown_instances_sort_after_configured_ones() {
        let group = group_members(
            "ext-1".to_string(),
            vec![
                EntityKey::new("g1", "gamma"),
                EntityKey::new("b1", "beta"),
            ],
            &registry(),
        )
        .unwrap();
        assert_eq!(group.primary, EntityKey::new("b1", "beta"));
    }

    #[test]
    fn canonical_resolution_is_idempotent() {
        let groups = vec![DuplicateGroup {
            external_id: "ext-1".to_string(),
            primary: EntityKey::new("a1", "alpha"),
            duplicates: vec![EntityKey::new("b1", "beta")],
        }];
        let mapping = canonical_mapping(&groups);

        let once = resolve_to_canonical(&mapping, &EntityKey::new("b1", "beta"));
        assert_eq!(once, EntityKey::new("a1", "alpha"));
        assert_eq!(resolve_to_canonical(&mapping, &once), once);

        let outside = EntityKey::new("z9", "beta");
        assert_eq!(resolve_to_canonical(&mapping, &outside), outside);
    }
}
