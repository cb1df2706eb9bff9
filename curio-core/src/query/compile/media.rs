//! Filter compilers for the remaining media kinds: galleries, groups,
//! images, and clips. These share the same field vocabulary, so the
//! compilers are straight-line applications of the shared helpers.

use curio_model::{
    ClipFilter, DateCriterion, GalleryFilter, GroupFilter, ImageFilter,
    NumericCriterion, RelationCriterion, TextCriterion,
};

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

const GALLERY_TAGS: JunctionSpec = JunctionSpec {
    table: "gallery_tags",
    owner_id: "gallery_id",
    owner_instance: "gallery_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};
const GALLERY_PERFORMERS: JunctionSpec = JunctionSpec {
    table: "gallery_performers",
    owner_id: "gallery_id",
    owner_instance: "gallery_instance_id",
    related_id: "performer_id",
    related_instance: "performer_instance_id",
};
const GROUP_TAGS: JunctionSpec = JunctionSpec {
    table: "group_tags",
    owner_id: "group_id",
    owner_instance: "group_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};
const IMAGE_TAGS: JunctionSpec = JunctionSpec {
    table: "image_tags",
    owner_id: "image_id",
    owner_instance: "image_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};
const IMAGE_PERFORMERS: JunctionSpec = JunctionSpec {
    table: "image_performers",
    owner_id: "image_id",
    owner_instance: "image_instance_id",
    related_id: "performer_id",
    related_instance: "performer_instance_id",
};
const CLIP_TAGS: JunctionSpec = JunctionSpec {
    table: "clip_tags",
    owner_id: "clip_id",
    owner_instance: "clip_instance_id",
    related_id: "tag_id",
    related_instance: "tag_instance_id",
};

pub fn compile_gallery(
    filter: &GalleryFilter,
    ctx: &CompileContext<'_>,
) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.title {
        if let Some(c) = TextCriterion::from_input("title", input)? {
            p = p.and(text_predicate("e.title", &c));
        }
    }
    if let Some(input) = &filter.rating {
        if let Some(c) = NumericCriterion::from_input("rating", input)? {
            p = p.and(numeric_predicate(RATING, &c));
        }
    }
    if let Some(input) = &filter.date {
        if let Some(c) = DateCriterion::from_input("date", input)? {
            p = p.and(super::date_predicate("e.date", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&GALLERY_TAGS, &c, ctx.tag_hierarchy));
        }
    }
    if let Some(input) = &filter.performers {
        if let Some(c) = RelationCriterion::from_input("performers", input)? {
            p = p.and(relation_predicate(&GALLERY_PERFORMERS, &c, None));
        }
    }

    Ok(p)
}

pub fn compile_group(
    filter: &GroupFilter,
    ctx: &CompileContext<'_>,
) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.name {
        if let Some(c) = TextCriterion::from_input("name", input)? {
            p = p.and(text_predicate("e.name", &c));
        }
    }
    if let Some(input) = &filter.rating {
        if let Some(c) = NumericCriterion::from_input("rating", input)? {
            p = p.and(numeric_predicate(RATING, &c));
        }
    }
    if let Some(input) = &filter.date {
        if let Some(c) = DateCriterion::from_input("date", input)? {
            p = p.and(super::date_predicate("e.date", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&GROUP_TAGS, &c, ctx.tag_hierarchy));
        }
    }

    Ok(p)
}

pub fn compile_image(
    filter: &ImageFilter,
    ctx: &CompileContext<'_>,
) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.title {
        if let Some(c) = TextCriterion::from_input("title", input)? {
            p = p.and(text_predicate("e.title", &c));
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
    if let Some(input) = &filter.date {
        if let Some(c) = DateCriterion::from_input("date", input)? {
            p = p.and(super::date_predicate("e.date", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&IMAGE_TAGS, &c, ctx.tag_hierarchy));
        }
    }
    if let Some(input) = &filter.performers {
        if let Some(c) = RelationCriterion::from_input("performers", input)? {
            p = p.and(relation_predicate(&IMAGE_PERFORMERS, &c, None));
        }
    }

    Ok(p)
}

pub fn compile_clip(filter: &ClipFilter, ctx: &CompileContext<'_>) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.title {
        if let Some(c) = TextCriterion::from_input("title", input)? {
            p = p.and(text_predicate("e.title", &c));
        }
    }
    if let Some(input) = &filter.rating {
        if let Some(c) = NumericCriterion::from_input("rating", input)? {
            p = p.and(numeric_predicate(RATING, &c));
        }
    }
    if let Some(input) = &filter.date {
        if let Some(c) = DateCriterion::from_input("date", input)? {
            p = p.and(super::date_predicate("e.date", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }
    if let Some(input) = &filter.tags {
        if let Some(c) = RelationCriterion::from_input("tags", input)? {
            p = p.and(relation_predicate(&CLIP_TAGS, &c, ctx.tag_hierarchy));
        }
    }

    Ok(p)
}
