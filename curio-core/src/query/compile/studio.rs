//! Studio filter compiler.

use curio_model::{NumericCriterion, RelationCriterion, StudioFilter, TextCriterion};

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

const STUDIO_TAGS: JunctionSpec = JunctionSpec {
    table: "studio_tags",
    owner_id: "studio_id",
    owner_instance: "studio_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};

pub fn compile_studio(
    filter: &StudioFilter,
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
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&STUDIO_TAGS, &c, ctx.tag_hierarchy));
        }
    }

    Ok(p)
}
