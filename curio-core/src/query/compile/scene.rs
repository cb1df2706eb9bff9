//! Scene filter compiler.
//!
//! Scenes are the richest kind: text and numeric fields, the organized
//! flag, a single-valued studio relation with parent expansion, and four
//! junction relations. Tag matching additionally consults the
//! denormalized `inherited_tag_ids` column so a scene tagged only through
//! its performers or studio still matches a tag filter.

use curio_model::{
    DateCriterion, EntityKey, NumericCriterion, RelationCriterion, SceneFilter,
    SetMode, TextCriterion,
};

use crate::error::Result;
use crate::query::predicate::{Bind, Predicate};

use crate::query::hierarchy::Hierarchy;

use super::{
    date_predicate, expand_group, expand_keys, favorite_predicate,
    junction_match_sql, key_arrays, numeric_predicate, relation_predicate,
    root_groups, single_relation_predicate, text_predicate, CompileContext,
    JunctionSpec, NumericExprs,
};

const RATING: NumericExprs = NumericExprs {
    value: "COALESCE(o.rating, e.rating, 0)",
    nullable: "COALESCE(o.rating, e.rating)",
};
const O_COUNT: NumericExprs = NumericExprs {
    value: "COALESCE(o.o_count, 0)",
    nullable: "o.o_count",
};
const PLAY_COUNT: NumericExprs = NumericExprs {
    value: "COALESCE(o.play_count, 0)",
    nullable: "o.play_count",
};

const SCENE_TAGS: JunctionSpec = JunctionSpec {
    table: "scene_tags",
    owner_id: "scene_id",
    owner_instance: "scene_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};
const SCENE_PERFORMERS: JunctionSpec = JunctionSpec {
    table: "scene_performers",
    owner_id: "scene_id",
    owner_instance: "scene_instance_id",
    related_id: "performer_id",
    related_instance: "performer_instance_id",
};
const SCENE_GALLERIES: JunctionSpec = JunctionSpec {
    table: "scene_galleries",
    owner_id: "scene_id",
    owner_instance: "scene_instance_id",
    related_id: "gallery_id",
    related_instance: "gallery_instance_id",
};
const SCENE_GROUPS: JunctionSpec = JunctionSpec {
    table: "scene_groups",
    owner_id: "scene_id",
    owner_instance: "scene_instance_id",
    related_id: "group_id",
    related_instance: "group_instance_id",
};

pub fn compile_scene(
    filter: &SceneFilter,
    ctx: &CompileContext<'_>,
) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.title {
        if let Some(c) = TextCriterion::from_input("title", input)? {
            p = p.and(text_predicate("e.title", &c));
        }
    }
    if let Some(input) = &filter.details {
        if let Some(c) = TextCriterion::from_input("details", input)? {
            p = p.and(text_predicate("e.details", &c));
        }
    }
    if let Some(input) = &filter.rating {
        if let Some(c) = NumericCriterion::from_input("rating", input)? {
            p = p.and(numeric_predicate(RATING, &c));
        }
    }
    if let Some(input) = &filter.o_count {
        if let Some(c) = NumericCriterion::from_input("o_count", input)? {
            p = p.and(numeric_predicate(O_COUNT, &c));
        }
    }
    if let Some(input) = &filter.play_count {
        if let Some(c) = NumericCriterion::from_input("play_count", input)? {
            p = p.and(numeric_predicate(PLAY_COUNT, &c));
        }
    }
    if let Some(input) = &filter.date {
        if let Some(c) = DateCriterion::from_input("date", input)? {
            p = p.and(date_predicate("e.date", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(organized) = filter.organized {
        p = p.and(Predicate::fragment(
            "e.organized = ?",
            vec![Bind::Bool(organized)],
        ));
    }

    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(tag_predicate(&c, ctx.tag_hierarchy));
        }
    }
    if let Some(input) = &filter.performers {
        if let Some(c) = RelationCriterion::from_input("performers", input)? {
            p = p.and(relation_predicate(&SCENE_PERFORMERS, &c, None));
        }
    }
    if let Some(input) = &filter.studios {
        if let Some(c) = RelationCriterion::from_input("studios", input)? {
            p = p.and(single_relation_predicate(
                "e.studio_id",
                "e.studio_instance_id",
                &c,
                ctx.studio_hierarchy,
            ));
        }
    }
    if let Some(input) = &filter.galleries {
        if let Some(c) = RelationCriterion::from_input("galleries", input)? {
            p = p.and(relation_predicate(&SCENE_GALLERIES, &c, None));
        }
    }
    if let Some(input) = &filter.groups {
        if let Some(c) = RelationCriterion::from_input("groups", input)? {
            p = p.and(relation_predicate(&SCENE_GROUPS, &c, None));
        }
    }

    Ok(p)
}

/// Tag matching over both the direct junction and the denormalized
/// inherited tags. Inherited tags are stored as bare ids; they match on
/// id alone. `INCLUDES_ALL` requires each requested tag (or one of its
/// descendants) to match on its own, direct or inherited.
fn tag_predicate(
    criterion: &RelationCriterion,
    hierarchy: Option<&Hierarchy>,
) -> Predicate {
    let body = junction_match_sql(&SCENE_TAGS);
    let matched = |keys: &[EntityKey]| -> Predicate {
        let (ids, instances) = key_arrays(keys);
        Predicate::Any(vec![
            Predicate::fragment(
                format!("EXISTS (SELECT 1 {body})"),
                vec![Bind::TextArray(ids.clone()), Bind::TextArray(instances)],
            ),
            Predicate::fragment(
                "e.inherited_tag_ids && ?",
                vec![Bind::TextArray(ids)],
            ),
        ])
    };
    match criterion.mode {
        SetMode::Includes => matched(&expand_keys(criterion, hierarchy)),
        SetMode::Excludes => {
            let (ids, instances) = key_arrays(&expand_keys(criterion, hierarchy));
            Predicate::none()
                .and(Predicate::fragment(
                    format!("NOT EXISTS (SELECT 1 {body})"),
                    vec![Bind::TextArray(ids.clone()), Bind::TextArray(instances)],
                ))
                .and(Predicate::fragment(
                    "NOT (COALESCE(e.inherited_tag_ids, '{}') && ?)",
                    vec![Bind::TextArray(ids)],
                ))
        }
        SetMode::IncludesAll => Predicate::All(
            root_groups(&criterion.keys)
                .iter()
                .map(|group| matched(&expand_group(group, criterion.depth, hierarchy)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::hierarchy::Hierarchy;
    use curio_model::CriterionInput;
    use serde_json::json;

    #[test]
    fn tag_includes_matches_direct_or_inherited() {
        let filter = SceneFilter {
            tags: Some(CriterionInput::new("INCLUDES", json!(["42"]))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert!(sql.contains("EXISTS (SELECT 1 FROM scene_tags"));
        assert!(sql.contains("e.inherited_tag_ids && $"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn tag_excludes_rejects_inherited_matches_too() {
        let filter = SceneFilter {
            tags: Some(CriterionInput::new("EXCLUDES", json!(["42"]))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM scene_tags"));
        assert!(sql.contains("NOT (COALESCE(e.inherited_tag_ids, '{}') && $"));
    }

    #[test]
    fn tag_depth_expands_through_the_hierarchy() {
        let parent = EntityKey::new("p", "alpha");
        let child = EntityKey::new("c", "alpha");
        let hierarchy = Hierarchy::from_edges(vec![(parent, child)]);
        let ctx = CompileContext {
            tag_hierarchy: Some(&hierarchy),
            studio_hierarchy: None,
        };

        let filter = SceneFilter {
            tags: Some(
                CriterionInput::new(
                    "INCLUDES",
                    json!([{"id": "p", "instance": "alpha"}]),
                )
                .with_depth(-1),
            ),
            ..Default::default()
        };
        let predicate = compile_scene(&filter, &ctx).unwrap();
        match predicate {
            Predicate::All(children) => match &children[0] {
                Predicate::Any(any) => match &any[0] {
                    Predicate::Fragment { binds, .. } => {
                        assert_eq!(
                            binds[0],
                            Bind::TextArray(vec!["p".into(), "c".into()])
                        );
                    }
                    other => panic!("unexpected leaf {other:?}"),
                },
                other => panic!("unexpected child {other:?}"),
            },
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn includes_all_tags_requires_each_tag_direct_or_inherited() {
        let filter = SceneFilter {
            tags: Some(CriterionInput::new("INCLUDES_ALL", json!(["1", "2"]))),
            ..Default::default()
        };
        let predicate = compile_scene(&filter, &CompileContext::default()).unwrap();
        let tags = match &predicate {
            Predicate::All(children) => &children[0],
            other => panic!("unexpected predicate {other:?}"),
        };
        match tags {
            // One direct-or-inherited requirement per requested tag.
            Predicate::All(parts) => {
                assert_eq!(parts.len(), 2);
                for part in parts {
                    let sql = part.display_sql();
                    assert!(sql.contains("EXISTS (SELECT 1 FROM scene_tags"));
                    assert!(sql.contains("e.inherited_tag_ids && $"));
                }
            }
            other => panic!("unexpected tag predicate {other:?}"),
        }
    }

    #[test]
    fn studio_filter_uses_the_scene_columns_directly() {
        let filter = SceneFilter {
            studios: Some(CriterionInput::new("INCLUDES", json!(["9"]))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert!(sql.contains("e.studio_id = k.id"));
        assert!(sql.contains("e.studio_instance_id = k.instance_id"));
    }

    #[test]
    fn includes_all_of_two_studios_is_impossible() {
        let filter = SceneFilter {
            studios: Some(CriterionInput::new("INCLUDES_ALL", json!(["1", "2"]))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert_eq!(sql, "(FALSE)");
    }

    #[test]
    fn rating_filter_coalesces_overlay_then_upstream() {
        let filter = SceneFilter {
            rating: Some(CriterionInput::new("GREATER_THAN", json!(80))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert_eq!(sql, "(COALESCE(o.rating, e.rating, 0) > $1)");
    }

    #[test]
    fn is_null_skips_the_zero_default() {
        let filter = SceneFilter {
            rating: Some(CriterionInput::new("IS_NULL", json!(null))),
            ..Default::default()
        };
        let sql = compile_scene(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert_eq!(sql, "(COALESCE(o.rating, e.rating) IS NULL)");
    }
}
