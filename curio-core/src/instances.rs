//! Instance resolution: which upstream instances a user may see, and the
//! configured priority used to pick duplicate-group primaries.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::warn;

use curio_model::{InstanceId, UserId};

use crate::settings::InstanceSettings;

/// Priority assigned to entities with no instance association; sorts
/// after every configured instance.
pub const UNKNOWN_INSTANCE_PRIORITY: i32 = i32::MAX;

#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    priorities: HashMap<InstanceId, i32>,
    enabled: Vec<InstanceId>,
}

impl InstanceRegistry {
    pub fn new(instances: &[InstanceSettings]) -> Self {
        let priorities = instances
            .iter()
            .map(|i| (InstanceId::new(i.id.clone()), i.priority))
            .collect();
        let enabled = instances
            .iter()
            .filter(|i| i.enabled)
            .map(|i| InstanceId::new(i.id.clone()))
            .collect();
        InstanceRegistry {
            priorities,
            enabled,
        }
    }

    pub fn enabled_instance_ids(&self) -> &[InstanceId] {
        &self.enabled
    }

    /// Configured priority for an instance. Unknown instances and the
    /// legacy sentinel sort last.
    pub fn priority(&self, instance: &InstanceId) -> i32 {
        if instance.is_legacy() {
            return UNKNOWN_INSTANCE_PRIORITY;
        }
        self.priorities
            .get(instance)
            .copied()
            .unwrap_or(UNKNOWN_INSTANCE_PRIORITY)
    }

    /// Resolves the instances a user may see. Anonymous callers get
    /// every enabled instance.
    ///
    /// An empty stored selection means all enabled instances; an explicit
    /// selection is intersected with the enabled set. A resolver failure
    /// yields the empty set, never "all": visibility fails closed.
    pub async fn allowed_instance_ids(
        &self,
        pool: &PgPool,
        user_id: Option<UserId>,
    ) -> Vec<InstanceId> {
        let Some(user_id) = user_id else {
            return self.enabled.clone();
        };
        let selected: Vec<String> = match sqlx::query_scalar(
            "SELECT instance_id FROM user_instance_selections WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(user = %user_id, error = %e, "instance resolution failed; failing closed");
                return Vec::new();
            }
        };

        if selected.is_empty() {
            return self.enabled.clone();
        }

        self.enabled
            .iter()
            .filter(|id| selected.iter().any(|s| s == id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(&[
            InstanceSettings {
                id: "alpha".to_string(),
                base_url: "https://alpha.example".to_string(),
                api_key: None,
                priority: 1,
                enabled: true,
            },
            InstanceSettings {
                id: "beta".to_string(),
                base_url: "https://beta.example".to_string(),
                api_key: None,
                priority: 2,
                enabled: false,
            },
        ])
    }

    #[test]
    fn disabled_instances_are_not_enabled() {
        let registry = registry();
        assert_eq!(registry.enabled_instance_ids(), &[InstanceId::new("alpha")]);
    }

    #[tokio::test]
    async fn anonymous_callers_see_every_enabled_instance() {
        let registry = registry();
        // Never queried: the anonymous path resolves before touching the pool.
        let pool = PgPool::connect_lazy("postgres://localhost/unreachable").unwrap();
        let allowed = registry.allowed_instance_ids(&pool, None).await;
        assert_eq!(allowed, vec![InstanceId::new("alpha")]);
    }

    #[test]
    fn unknown_and_legacy_instances_sort_last() {
        let registry = registry();
        assert_eq!(registry.priority(&InstanceId::new("alpha")), 1);
        assert_eq!(
            registry.priority(&InstanceId::new("gamma")),
            UNKNOWN_INSTANCE_PRIORITY
        );
        assert_eq!(
            registry.priority(&InstanceId::legacy()),
            UNKNOWN_INSTANCE_PRIORITY
        );
    }
}
