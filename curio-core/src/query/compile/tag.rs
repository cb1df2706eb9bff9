//! Tag filter compiler. Tags carry no relations of their own.

use curio_model::{TagFilter, TextCriterion};

use crate::error::Result;
use crate::query::predicate::Predicate;

use super::{favorite_predicate, text_predicate};

pub fn compile_tag(filter: &TagFilter) -> Result<Predicate> {
    let mut p = Predicate::none();

    if let Some(input) = &filter.name {
        if let Some(c) = TextCriterion::from_input("name", input)? {
            p = p.and(text_predicate("e.name", &c));
        }
    }
    if let Some(input) = &filter.description {
        if let Some(c) = TextCriterion::from_input("description", input)? {
            p = p.and(text_predicate("e.description", &c));
        }
    }
    if let Some(favorite) = filter.favorite {
        p = p.and(favorite_predicate(favorite));
    }

    Ok(p)
}
