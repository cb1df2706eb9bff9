//! Hierarchy expansion for tag (and studio-parent) filters.
//!
//! Upstream hierarchies are user-editable and cannot be assumed acyclic,
//! so expansion walks breadth-first with a visited set and a hard safety
//! bound instead of recursing.

use std::collections::{HashMap, HashSet, VecDeque};

use sqlx::{PgPool, Row};
use tracing::warn;

use curio_model::{EntityKey, InstanceId};

use crate::error::Result;

/// Upper bound on expansion hops, including "unbounded" expansion. A
/// well-formed hierarchy never gets close; hitting it means a cycle or a
/// corrupt parent graph, and expansion stops rather than looping.
pub const MAX_EXPANSION_DEPTH: u32 = 64;

/// Parent-to-children edge map for one hierarchical relation.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    children: HashMap<EntityKey, Vec<EntityKey>>,
}

impl Hierarchy {
    pub fn from_edges(edges: impl IntoIterator<Item = (EntityKey, EntityKey)>) -> Self {
        let mut children: HashMap<EntityKey, Vec<EntityKey>> = HashMap::new();
        for (parent, child) in edges {
            children.entry(parent).or_default().push(child);
        }
        Hierarchy { children }
    }

    /// Loads the tag parent graph from the mirror.
    pub async fn load_tags(pool: &PgPool) -> Result<Self> {
        Self::load(pool, "SELECT parent_id, parent_instance_id, child_id, child_instance_id FROM tag_hierarchy").await
    }

    /// Loads the studio parent graph from the mirror.
    pub async fn load_studios(pool: &PgPool) -> Result<Self> {
        Self::load(
            pool,
            "SELECT parent_id, parent_instance_id, id AS child_id, instance_id AS child_instance_id \
             FROM studios WHERE parent_id IS NOT NULL",
        )
        .await
    }

    async fn load(pool: &PgPool, sql: &str) -> Result<Self> {
        let rows = sqlx::query(sql).fetch_all(pool).await?;
        let edges = rows.into_iter().map(|row| {
            let parent = EntityKey::new(
                row.get::<String, _>("parent_id"),
                InstanceId::new(row.get::<String, _>("parent_instance_id")),
            );
            let child = EntityKey::new(
                row.get::<String, _>("child_id"),
                InstanceId::new(row.get::<String, _>("child_instance_id")),
            );
            (parent, child)
        });
        Ok(Self::from_edges(edges))
    }

    fn children_of<'a>(
        &'a self,
        key: &'a EntityKey,
    ) -> impl Iterator<Item = &'a EntityKey> + 'a {
        // A legacy-sentinel key expands through edges on any instance.
        self.children
            .iter()
            .filter(move |(parent, _)| parent.matches(key))
            .flat_map(|(_, children)| children.iter())
    }

    /// Returns the closure of `ids` plus descendants reachable within
    /// `depth` hops. `None`/`0` disables expansion; negative depth
    /// expands fully (bounded by [`MAX_EXPANSION_DEPTH`]).
    pub fn expand(&self, ids: &[EntityKey], depth: Option<i32>) -> Vec<EntityKey> {
        let hops = match depth {
            None | Some(0) => return ids.to_vec(),
            Some(d) if d < 0 => MAX_EXPANSION_DEPTH,
            Some(d) => (d as u32).min(MAX_EXPANSION_DEPTH),
        };

        let mut seen: HashSet<EntityKey> = ids.iter().cloned().collect();
        let mut out: Vec<EntityKey> = ids.to_vec();
        let mut frontier: VecDeque<EntityKey> = ids.iter().cloned().collect();

        for hop in 0..hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = VecDeque::new();
            while let Some(key) = frontier.pop_front() {
                for child in self.children_of(&key) {
                    if seen.insert(child.clone()) {
                        out.push(child.clone());
                        next.push_back(child.clone());
                    }
                }
            }
            if hop + 1 == hops && !next.is_empty() && depth.is_some_and(|d| d < 0) {
                warn!(
                    frontier = next.len(),
                    "hierarchy expansion hit the safety bound; stopping"
                );
            }
            frontier = next;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> EntityKey {
        EntityKey::new(id, "alpha")
    }

    fn sample() -> Hierarchy {
        Hierarchy::from_edges(vec![
            (key("root"), key("a")),
            (key("root"), key("b")),
            (key("a"), key("a1")),
            (key("a1"), key("a2")),
        ])
    }

    #[test]
    fn depth_zero_is_identity() {
        let h = sample();
        let ids = vec![key("root")];
        assert_eq!(h.expand(&ids, None), ids);
        assert_eq!(h.expand(&ids, Some(0)), ids);
    }

    #[test]
    fn depth_limits_hops() {
        let h = sample();
        let one = h.expand(&[key("root")], Some(1));
        assert_eq!(one, vec![key("root"), key("a"), key("b")]);

        let all = h.expand(&[key("root")], Some(-1));
        assert_eq!(all.len(), 5);
        assert!(all.contains(&key("a2")));
    }

    #[test]
    fn cycles_terminate() {
        let h = Hierarchy::from_edges(vec![
            (key("x"), key("y")),
            (key("y"), key("z")),
            (key("z"), key("x")),
            (key("self"), key("self")),
        ]);
        let out = h.expand(&[key("x")], Some(-1));
        assert_eq!(out, vec![key("x"), key("y"), key("z")]);

        let out = h.expand(&[key("self")], Some(-1));
        assert_eq!(out, vec![key("self")]);
    }

    #[test]
    fn legacy_sentinel_expands_across_instances() {
        let h = sample();
        let out = h.expand(&[EntityKey::legacy("root")], Some(1));
        assert_eq!(out.len(), 3);
    }
}
