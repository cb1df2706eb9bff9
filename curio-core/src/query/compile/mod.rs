//! Filter clause compilation: one compiler per entity kind over a shared
//! operator vocabulary.
//!
//! Compilers turn a validated criterion into a [`Predicate`] fragment
//! with bound values. Absent criteria contribute nothing; the planner
//! ANDs whatever is produced onto the base predicate. Junction
//! sub-predicates are always scoped by the owning row's composite key so
//! a relation row belonging to another instance can never satisfy a
//! filter.

mod media;
mod performer;
mod scene;
mod studio;
mod tag;

pub use media::{compile_clip, compile_gallery, compile_group, compile_image};
pub use performer::compile_performer;
pub use scene::compile_scene;
pub use studio::compile_studio;
pub use tag::compile_tag;

use curio_model::{
    DateCriterion, EntityFilter, EntityKey, NumericCriterion, RelationCriterion,
    SetMode, TextCriterion,
};

use crate::query::hierarchy::Hierarchy;
use crate::query::predicate::{Bind, Predicate};

/// Hierarchies pre-loaded by the planner when a filter requests
/// expansion. Compilation itself stays synchronous and side-effect free.
#[derive(Debug, Default)]
pub struct CompileContext<'a> {
    pub tag_hierarchy: Option<&'a Hierarchy>,
    pub studio_hierarchy: Option<&'a Hierarchy>,
}

/// Junction relation between an owning entity (aliased `e`) and a
/// related entity, carrying composite keys for both sides.
#[derive(Debug, Clone, Copy)]
pub struct JunctionSpec {
    pub table: &'static str,
    pub owner_id: &'static str,
    pub owner_instance: &'static str,
    pub related_id: &'static str,
    pub related_instance: &'static str,
}

/// Escapes LIKE wildcards in user text with a backslash escape.
pub fn escape_like_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
    }
    out
}

/// Column expressions for a numeric field: `value` is the fully
/// coalesced three-tier expression (user overlay, upstream value, zero);
/// `nullable` is the same chain without the zero default, used for the
/// null-ness operators.
#[derive(Debug, Clone, Copy)]
pub struct NumericExprs {
    pub value: &'static str,
    pub nullable: &'static str,
}

pub(crate) fn numeric_predicate(exprs: NumericExprs, c: &NumericCriterion) -> Predicate {
    match *c {
        NumericCriterion::Equals(v) => {
            Predicate::fragment(format!("{} = ?", exprs.value), vec![Bind::Float(v)])
        }
        NumericCriterion::NotEquals(v) => {
            Predicate::fragment(format!("{} <> ?", exprs.value), vec![Bind::Float(v)])
        }
        NumericCriterion::GreaterThan(v) => {
            Predicate::fragment(format!("{} > ?", exprs.value), vec![Bind::Float(v)])
        }
        NumericCriterion::LessThan(v) => {
            Predicate::fragment(format!("{} < ?", exprs.value), vec![Bind::Float(v)])
        }
        NumericCriterion::Between(lo, hi) => Predicate::fragment(
            format!("{} BETWEEN ? AND ?", exprs.value),
            vec![Bind::Float(lo), Bind::Float(hi)],
        ),
        NumericCriterion::NotBetween(lo, hi) => Predicate::fragment(
            format!("{} NOT BETWEEN ? AND ?", exprs.value),
            vec![Bind::Float(lo), Bind::Float(hi)],
        ),
        NumericCriterion::IsNull => {
            Predicate::fragment(format!("{} IS NULL", exprs.nullable), Vec::new())
        }
        NumericCriterion::NotNull => {
            Predicate::fragment(format!("{} IS NOT NULL", exprs.nullable), Vec::new())
        }
    }
}

pub(crate) fn text_predicate(column: &str, c: &TextCriterion) -> Predicate {
    match c {
        TextCriterion::Includes(text) => Predicate::fragment(
            format!("{column} ILIKE ? ESCAPE E'\\\\'"),
            vec![Bind::Text(format!("%{}%", escape_like_literal(text)))],
        ),
        TextCriterion::Excludes(text) => Predicate::fragment(
            format!("({column} IS NULL OR {column} NOT ILIKE ? ESCAPE E'\\\\')"),
            vec![Bind::Text(format!("%{}%", escape_like_literal(text)))],
        ),
        TextCriterion::Equals(text) => Predicate::fragment(
            format!("LOWER({column}) = LOWER(?)"),
            vec![Bind::Text(text.clone())],
        ),
        TextCriterion::NotEquals(text) => Predicate::fragment(
            format!("({column} IS NULL OR LOWER({column}) <> LOWER(?))"),
            vec![Bind::Text(text.clone())],
        ),
        TextCriterion::IsNull => Predicate::fragment(
            format!("({column} IS NULL OR {column} = '')"),
            Vec::new(),
        ),
        TextCriterion::NotNull => Predicate::fragment(
            format!("({column} IS NOT NULL AND {column} <> '')"),
            Vec::new(),
        ),
    }
}

pub(crate) fn date_predicate(column: &str, c: &DateCriterion) -> Predicate {
    match *c {
        // Equality works on the normalized date grain, ignoring
        // time-of-day; ordering comparisons stay raw chronological.
        DateCriterion::Equals(d) => {
            Predicate::fragment(format!("{column}::date = ?"), vec![Bind::Date(d)])
        }
        DateCriterion::NotEquals(d) => {
            Predicate::fragment(format!("{column}::date <> ?"), vec![Bind::Date(d)])
        }
        DateCriterion::GreaterThan(d) => {
            Predicate::fragment(format!("{column} > ?"), vec![Bind::Date(d)])
        }
        DateCriterion::LessThan(d) => {
            Predicate::fragment(format!("{column} < ?"), vec![Bind::Date(d)])
        }
        DateCriterion::Between(lo, hi) => Predicate::fragment(
            format!("{column} BETWEEN ? AND ?"),
            vec![Bind::Date(lo), Bind::Date(hi)],
        ),
        DateCriterion::NotBetween(lo, hi) => Predicate::fragment(
            format!("{column} NOT BETWEEN ? AND ?"),
            vec![Bind::Date(lo), Bind::Date(hi)],
        ),
        DateCriterion::IsNull => {
            Predicate::fragment(format!("{column} IS NULL"), Vec::new())
        }
        DateCriterion::NotNull => {
            Predicate::fragment(format!("{column} IS NOT NULL"), Vec::new())
        }
    }
}

pub(crate) fn favorite_predicate(value: bool) -> Predicate {
    Predicate::fragment("COALESCE(o.favorite, FALSE) = ?", vec![Bind::Bool(value)])
}

/// Splits composite keys into parallel id/instance arrays for `unnest`.
fn key_arrays(keys: &[EntityKey]) -> (Vec<String>, Vec<String>) {
    let ids = keys.iter().map(|k| k.id.clone()).collect();
    let instances = keys.iter().map(|k| k.instance.as_str().to_string()).collect();
    (ids, instances)
}

/// Number of distinct requested ids.
fn distinct_id_count(keys: &[EntityKey]) -> i64 {
    let mut ids: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len() as i64
}

/// Requested keys grouped by bare id, first-seen order. `INCLUDES_ALL`
/// requires one match per group; two keys sharing an id are one
/// requirement, not two.
fn root_groups(keys: &[EntityKey]) -> Vec<Vec<EntityKey>> {
    let mut groups: Vec<Vec<EntityKey>> = Vec::new();
    for key in keys {
        match groups.iter_mut().find(|g| g[0].id == key.id) {
            Some(group) => group.push(key.clone()),
            None => groups.push(vec![key.clone()]),
        }
    }
    groups
}

fn expand_group(
    group: &[EntityKey],
    depth: Option<i32>,
    hierarchy: Option<&Hierarchy>,
) -> Vec<EntityKey> {
    match (depth, hierarchy) {
        (Some(d), Some(h)) if d != 0 => h.expand(group, Some(d)),
        _ => group.to_vec(),
    }
}

/// The join condition matching a junction's related key against a
/// requested key, honoring the legacy sentinel on either side.
const KEY_MATCH: &str =
    "(k.instance_id = '' OR j.RINST = '' OR j.RINST = k.instance_id)";

fn junction_match_sql(spec: &JunctionSpec) -> String {
    format!(
        "FROM {table} j JOIN unnest(?::text[], ?::text[]) AS k(id, instance_id) \
         ON j.{rid} = k.id AND {key_match} \
         WHERE j.{oid} = e.id AND j.{oinst} = e.instance_id",
        table = spec.table,
        rid = spec.related_id,
        oid = spec.owner_id,
        oinst = spec.owner_instance,
        key_match = KEY_MATCH.replace("RINST", spec.related_instance),
    )
}

/// Compiles a set-membership criterion over a many-to-many junction.
///
/// `INCLUDES_ALL` emits one EXISTS per requested id, each over that id's
/// own expansion. Two descendants of one requested key satisfy that key
/// once; they never stand in for a different requested key.
pub(crate) fn relation_predicate(
    spec: &JunctionSpec,
    criterion: &RelationCriterion,
    hierarchy: Option<&Hierarchy>,
) -> Predicate {
    let body = junction_match_sql(spec);
    let exists = |keys: &[EntityKey]| -> Predicate {
        let (ids, instances) = key_arrays(keys);
        Predicate::fragment(
            format!("EXISTS (SELECT 1 {body})"),
            vec![Bind::TextArray(ids), Bind::TextArray(instances)],
        )
    };
    match criterion.mode {
        SetMode::Includes => exists(&expand_keys(criterion, hierarchy)),
        SetMode::Excludes => {
            let (ids, instances) = key_arrays(&expand_keys(criterion, hierarchy));
            Predicate::fragment(
                format!("NOT EXISTS (SELECT 1 {body})"),
                vec![Bind::TextArray(ids), Bind::TextArray(instances)],
            )
        }
        SetMode::IncludesAll => Predicate::All(
            root_groups(&criterion.keys)
                .iter()
                .map(|group| exists(&expand_group(group, criterion.depth, hierarchy)))
                .collect(),
        ),
    }
}

/// Set membership against a single-valued relation (a scene's studio).
/// Without expansion, `INCLUDES_ALL` of more than one entity can never
/// hold; under expansion a single value may descend from every requested
/// ancestor, so each requirement gets its own membership check.
pub(crate) fn single_relation_predicate(
    id_column: &str,
    instance_column: &str,
    criterion: &RelationCriterion,
    hierarchy: Option<&Hierarchy>,
) -> Predicate {
    let body = format!(
        "EXISTS (SELECT 1 FROM unnest(?::text[], ?::text[]) AS k(id, instance_id) \
         WHERE {id_column} = k.id \
         AND (k.instance_id = '' OR {instance_column} = '' OR {instance_column} = k.instance_id))",
    );
    let member = |keys: &[EntityKey]| -> Predicate {
        let (ids, instances) = key_arrays(keys);
        Predicate::fragment(
            body.clone(),
            vec![Bind::TextArray(ids), Bind::TextArray(instances)],
        )
    };
    match criterion.mode {
        SetMode::Includes => member(&expand_keys(criterion, hierarchy)),
        SetMode::Excludes => {
            let (ids, instances) = key_arrays(&expand_keys(criterion, hierarchy));
            Predicate::fragment(
                format!("NOT {body}"),
                vec![Bind::TextArray(ids), Bind::TextArray(instances)],
            )
        }
        SetMode::IncludesAll => {
            let expanding =
                matches!((criterion.depth, hierarchy), (Some(d), Some(_)) if d != 0);
            if !expanding && distinct_id_count(&criterion.keys) > 1 {
                return Predicate::Any(Vec::new());
            }
            Predicate::All(
                root_groups(&criterion.keys)
                    .iter()
                    .map(|group| member(&expand_group(group, criterion.depth, hierarchy)))
                    .collect(),
            )
        }
    }
}

/// Expands criterion keys through a hierarchy when requested.
pub(crate) fn expand_keys(
    criterion: &RelationCriterion,
    hierarchy: Option<&Hierarchy>,
) -> Vec<EntityKey> {
    expand_group(&criterion.keys, criterion.depth, hierarchy)
}

/// Whether any requested filter field reads the per-user overlay join.
/// The count query may skip the overlay joins when this is false and no
/// exclusion overlay is applied.
pub fn filter_uses_overlay(filter: &EntityFilter) -> bool {
    match filter {
        EntityFilter::Scene(f) => {
            f.rating.is_some()
                || f.o_count.is_some()
                || f.play_count.is_some()
                || f.favorite.is_some()
        }
        EntityFilter::Performer(f) => {
            f.rating.is_some() || f.o_count.is_some() || f.favorite.is_some()
        }
        EntityFilter::Studio(f) => f.rating.is_some() || f.favorite.is_some(),
        EntityFilter::Tag(f) => f.favorite.is_some(),
        EntityFilter::Gallery(f) => f.rating.is_some() || f.favorite.is_some(),
        EntityFilter::Group(f) => f.rating.is_some() || f.favorite.is_some(),
        EntityFilter::Image(f) => {
            f.rating.is_some() || f.o_count.is_some() || f.favorite.is_some()
        }
        EntityFilter::Clip(f) => f.rating.is_some() || f.favorite.is_some(),
    }
}

/// Dispatches to the per-kind compiler.
pub fn compile(
    filter: &EntityFilter,
    ctx: &CompileContext<'_>,
) -> crate::error::Result<Predicate> {
    match filter {
        EntityFilter::Scene(f) => compile_scene(f, ctx),
        EntityFilter::Performer(f) => compile_performer(f, ctx),
        EntityFilter::Studio(f) => compile_studio(f, ctx),
        EntityFilter::Tag(f) => compile_tag(f),
        EntityFilter::Gallery(f) => compile_gallery(f, ctx),
        EntityFilter::Group(f) => compile_group(f, ctx),
        EntityFilter::Image(f) => compile_image(f, ctx),
        EntityFilter::Clip(f) => compile_clip(f, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_model::{CriterionInput, SceneFilter};
    use serde_json::json;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like_literal("50%_\\"), "50\\%\\_\\\\");
    }

    #[test]
    fn empty_filter_compiles_to_no_predicate() {
        let filter = EntityFilter::Scene(SceneFilter::default());
        let predicate = compile(&filter, &CompileContext::default()).unwrap();
        assert!(predicate.is_vacuous());
    }

    #[test]
    fn empty_value_set_is_equivalent_to_omitting_the_filter() {
        let with_empty = EntityFilter::Scene(SceneFilter {
            tags: Some(CriterionInput::new("INCLUDES", json!([]))),
            ..Default::default()
        });
        let omitted = EntityFilter::Scene(SceneFilter::default());
        let ctx = CompileContext::default();
        assert_eq!(
            compile(&with_empty, &ctx).unwrap().display_sql(),
            compile(&omitted, &ctx).unwrap().display_sql()
        );
    }

    #[test]
    fn unknown_modifier_compiles_to_no_predicate() {
        let filter = EntityFilter::Scene(SceneFilter {
            rating: Some(CriterionInput::new("REGEX", json!(50))),
            ..Default::default()
        });
        let predicate = compile(&filter, &CompileContext::default()).unwrap();
        assert!(predicate.is_vacuous());
    }

    #[test]
    fn malformed_value_fails_the_request() {
        let filter = EntityFilter::Scene(SceneFilter {
            rating: Some(CriterionInput::new("GREATER_THAN", json!("eighty"))),
            ..Default::default()
        });
        assert!(compile(&filter, &CompileContext::default()).is_err());
    }

    fn first_binds(p: &Predicate) -> Vec<String> {
        match p {
            Predicate::Fragment { binds, .. } => match &binds[0] {
                Bind::TextArray(ids) => ids.clone(),
                other => panic!("unexpected bind {other:?}"),
            },
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn includes_all_requires_each_requested_id_separately() {
        let criterion = RelationCriterion {
            mode: SetMode::IncludesAll,
            keys: vec![
                EntityKey::new("1", "alpha"),
                EntityKey::new("1", "beta"),
                EntityKey::new("2", "alpha"),
            ],
            depth: None,
        };
        let spec = JunctionSpec {
            table: "scene_tags",
            owner_id: "scene_id",
            owner_instance: "scene_instance_id",
            related_id: "tag_id",
            related_instance: "tag_instance_id",
        };
        let p = relation_predicate(&spec, &criterion, None);
        match &p {
            // Two requirements: id "1" (on either instance) and id "2".
            Predicate::All(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(first_binds(&parts[0]), vec!["1", "1"]);
                assert_eq!(first_binds(&parts[1]), vec!["2"]);
            }
            other => panic!("unexpected predicate {other:?}"),
        }
        assert_eq!(p.display_sql().matches("EXISTS").count(), 2);
    }

    #[test]
    fn includes_all_expansion_stays_with_its_own_root() {
        // p1 has two children; a scene carrying both of them still
        // satisfies only the p1 requirement, never p2's.
        let hierarchy = Hierarchy::from_edges(vec![
            (EntityKey::new("p1", "alpha"), EntityKey::new("c1a", "alpha")),
            (EntityKey::new("p1", "alpha"), EntityKey::new("c1b", "alpha")),
            (EntityKey::new("p2", "alpha"), EntityKey::new("c2", "alpha")),
        ]);
        let criterion = RelationCriterion {
            mode: SetMode::IncludesAll,
            keys: vec![EntityKey::new("p1", "alpha"), EntityKey::new("p2", "alpha")],
            depth: Some(-1),
        };
        let spec = JunctionSpec {
            table: "scene_tags",
            owner_id: "scene_id",
            owner_instance: "scene_instance_id",
            related_id: "tag_id",
            related_instance: "tag_instance_id",
        };
        let p = relation_predicate(&spec, &criterion, Some(&hierarchy));
        match &p {
            Predicate::All(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(first_binds(&parts[0]), vec!["p1", "c1a", "c1b"]);
                assert_eq!(first_binds(&parts[1]), vec!["p2", "c2"]);
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn junction_predicates_scope_by_owner_composite_key() {
        let criterion = RelationCriterion {
            mode: SetMode::Includes,
            keys: vec![EntityKey::new("7", "alpha")],
            depth: None,
        };
        let spec = JunctionSpec {
            table: "scene_performers",
            owner_id: "scene_id",
            owner_instance: "scene_instance_id",
            related_id: "performer_id",
            related_instance: "performer_instance_id",
        };
        let sql = relation_predicate(&spec, &criterion, None).display_sql();
        assert!(sql.contains("j.scene_id = e.id AND j.scene_instance_id = e.instance_id"));
        assert!(sql.contains("j.performer_instance_id = k.instance_id"));
    }
}
