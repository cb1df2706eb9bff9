//! Performer filter compiler.

use curio_model::{NumericCriterion, PerformerFilter, RelationCriterion, TextCriterion};

use crate::error::Result;
use crate::query::predicate::Predicate;

use super::{
    favorite_predicate, numeric_predicate, relation_predicate, text_predicate,
    CompileContext, JunctionSpec, NumericExprs,
};

const RATING: NumericExprs = NumericExprs {
    value: "COALESCE(o.rating, e.rating, 0)",
    nullable: "COALESCE(o.rating, e.rating)",
};
const O_COUNT: NumericExprs = NumericExprs {
    value: "COALESCE(o.o_count, 0)",
    nullable: "o.o_count",
};

const PERFORMER_TAGS: JunctionSpec = JunctionSpec {
    table: "performer_tags",
    owner_id: "performer_id",
    owner_instance: "performer_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};

pub fn compile_performer(
    filter: &PerformerFilter,
    ctx: &CompileContext<'_>,
) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.name {
        if let Some(c) = TextCriterion::from_input("name", input)? {
            p = p.and(text_predicate("e.name", &c));
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
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&PERFORMER_TAGS, &c, ctx.tag_hierarchy));
        }
    }

    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_model::CriterionInput;
    use serde_json::json;

    #[test]
    fn name_search_is_case_insensitive_containment() {
        let filter = PerformerFilter {
            name: Some(CriterionInput::new("INCLUDES", json!("jane"))),
            ..Default::default()
        };
        let sql = compile_performer(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert!(sql.contains("e.name ILIKE $1"));
    }

    #[test]
    fn favorite_defaults_to_false_without_an_overlay_row() {
        let filter = PerformerFilter {
            favorite: Some(true),
            ..Default::default()
        };
        let sql = compile_performer(&filter, &CompileContext::default())
            .unwrap()
            .display_sql();
        assert_eq!(sql, "(COALESCE(o.favorite, FALSE) = $1)");
    }
}
