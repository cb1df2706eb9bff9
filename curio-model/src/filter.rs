//! Declarative per-field filter descriptions.
//!
//! Filters arrive as loose [`CriterionInput`] values (a modifier name plus
//! a JSON payload) and are validated into the typed criterion variants at
//! the compiler boundary. The validation contract is asymmetric on
//! purpose: an unknown modifier or an empty value set parses to `None`
//! (the filter is vacuously true and callers simply omit it), while a
//! malformed value for a known modifier is a client-input error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::ids::{EntityKey, InstanceId};
use crate::kind::EntityKind;

/// The closed operator vocabulary shared by every filter compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modifier {
    Includes,
    IncludesAll,
    Excludes,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    NotBetween,
    IsNull,
    NotNull,
}

impl Modifier {
    /// Parses a modifier name; unknown names are `None`, never an error.
    pub fn parse(value: &str) -> Option<Modifier> {
        match value {
            "INCLUDES" => Some(Modifier::Includes),
            "INCLUDES_ALL" => Some(Modifier::IncludesAll),
            "EXCLUDES" => Some(Modifier::Excludes),
            "EQUALS" => Some(Modifier::Equals),
            "NOT_EQUALS" => Some(Modifier::NotEquals),
            "GREATER_THAN" => Some(Modifier::GreaterThan),
            "LESS_THAN" => Some(Modifier::LessThan),
            "BETWEEN" => Some(Modifier::Between),
            "NOT_BETWEEN" => Some(Modifier::NotBetween),
            "IS_NULL" => Some(Modifier::IsNull),
            "NOT_NULL" => Some(Modifier::NotNull),
            _ => None,
        }
    }
}

/// Raw, untrusted filter input for one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriterionInput {
    pub modifier: String,
    #[serde(default)]
    pub value: Value,
    /// Hierarchy expansion depth for relation filters over hierarchical
    /// kinds (tags, studio parents). `None`/`0` disables expansion; a
    /// negative depth expands fully.
    #[serde(default)]
    pub depth: Option<i32>,
}

impl CriterionInput {
    pub fn new(modifier: &str, value: Value) -> Self {
        CriterionInput {
            modifier: modifier.to_string(),
            value,
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }
}

fn bad_value(field: &str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidFilterValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn expect_f64(field: &str, value: &Value) -> Result<f64, ModelError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| bad_value(field, "number out of range")),
        other => Err(bad_value(field, format!("expected a number, got {other}"))),
    }
}

fn expect_f64_pair(field: &str, value: &Value) -> Result<(f64, f64), ModelError> {
    match value {
        Value::Array(items) if items.len() == 2 => Ok((
            expect_f64(field, &items[0])?,
            expect_f64(field, &items[1])?,
        )),
        other => Err(bad_value(
            field,
            format!("expected a two-element array, got {other}"),
        )),
    }
}

fn expect_text(field: &str, value: &Value) -> Result<String, ModelError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(bad_value(field, format!("expected a string, got {other}"))),
    }
}

fn expect_date(field: &str, value: &Value) -> Result<NaiveDate, ModelError> {
    let text = expect_text(field, value)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| bad_value(field, format!("invalid date `{text}`: {e}")))
}

fn expect_date_pair(
    field: &str,
    value: &Value,
) -> Result<(NaiveDate, NaiveDate), ModelError> {
    match value {
        Value::Array(items) if items.len() == 2 => Ok((
            expect_date(field, &items[0])?,
            expect_date(field, &items[1])?,
        )),
        other => Err(bad_value(
            field,
            format!("expected a two-element array, got {other}"),
        )),
    }
}

fn expect_keys(field: &str, value: &Value) -> Result<Vec<EntityKey>, ModelError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(bad_value(
                field,
                format!("expected an array of ids, got {other}"),
            ));
        }
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        match item {
            // Bare ids carry the legacy sentinel and match any instance.
            Value::String(id) => keys.push(EntityKey::legacy(id.clone())),
            Value::Number(id) => keys.push(EntityKey::legacy(id.to_string())),
            Value::Object(map) => {
                let id = map
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad_value(field, "id entry missing `id`"))?;
                let instance = map
                    .get("instance")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                keys.push(EntityKey::new(id, InstanceId::new(instance)));
            }
            other => {
                return Err(bad_value(field, format!("invalid id entry {other}")));
            }
        }
    }
    Ok(keys)
}

/// Numeric comparison against a null-coalesced expression (user overlay,
/// then upstream value, then zero).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericCriterion {
    Equals(f64),
    NotEquals(f64),
    GreaterThan(f64),
    LessThan(f64),
    Between(f64, f64),
    NotBetween(f64, f64),
    IsNull,
    NotNull,
}

impl NumericCriterion {
    pub fn from_input(
        field: &str,
        input: &CriterionInput,
    ) -> Result<Option<Self>, ModelError> {
        let Some(modifier) = Modifier::parse(&input.modifier) else {
            return Ok(None);
        };
        let criterion = match modifier {
            Modifier::Equals => NumericCriterion::Equals(expect_f64(field, &input.value)?),
            Modifier::NotEquals => {
                NumericCriterion::NotEquals(expect_f64(field, &input.value)?)
            }
            Modifier::GreaterThan => {
                NumericCriterion::GreaterThan(expect_f64(field, &input.value)?)
            }
            Modifier::LessThan => {
                NumericCriterion::LessThan(expect_f64(field, &input.value)?)
            }
            Modifier::Between => {
                let (lo, hi) = expect_f64_pair(field, &input.value)?;
                NumericCriterion::Between(lo, hi)
            }
            Modifier::NotBetween => {
                let (lo, hi) = expect_f64_pair(field, &input.value)?;
                NumericCriterion::NotBetween(lo, hi)
            }
            Modifier::IsNull => NumericCriterion::IsNull,
            Modifier::NotNull => NumericCriterion::NotNull,
            // Set modifiers have no meaning on scalar fields.
            _ => return Ok(None),
        };
        Ok(Some(criterion))
    }
}

/// Case-insensitive text matching; containment by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCriterion {
    Includes(String),
    Excludes(String),
    Equals(String),
    NotEquals(String),
    IsNull,
    NotNull,
}

impl TextCriterion {
    pub fn from_input(
        field: &str,
        input: &CriterionInput,
    ) -> Result<Option<Self>, ModelError> {
        let Some(modifier) = Modifier::parse(&input.modifier) else {
            return Ok(None);
        };
        let criterion = match modifier {
            Modifier::Includes => {
                let text = expect_text(field, &input.value)?;
                if text.is_empty() {
                    return Ok(None);
                }
                TextCriterion::Includes(text)
            }
            Modifier::Excludes => {
                let text = expect_text(field, &input.value)?;
                if text.is_empty() {
                    return Ok(None);
                }
                TextCriterion::Excludes(text)
            }
            Modifier::Equals => TextCriterion::Equals(expect_text(field, &input.value)?),
            Modifier::NotEquals => {
                TextCriterion::NotEquals(expect_text(field, &input.value)?)
            }
            Modifier::IsNull => TextCriterion::IsNull,
            Modifier::NotNull => TextCriterion::NotNull,
            _ => return Ok(None),
        };
        Ok(Some(criterion))
    }
}

/// Date comparisons: equality on the normalized date grain, raw
/// chronological comparison for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCriterion {
    Equals(NaiveDate),
    NotEquals(NaiveDate),
    GreaterThan(NaiveDate),
    LessThan(NaiveDate),
    Between(NaiveDate, NaiveDate),
    NotBetween(NaiveDate, NaiveDate),
    IsNull,
    NotNull,
}

impl DateCriterion {
    pub fn from_input(
        field: &str,
        input: &CriterionInput,
    ) -> Result<Option<Self>, ModelError> {
        let Some(modifier) = Modifier::parse(&input.modifier) else {
            return Ok(None);
        };
        let criterion = match modifier {
            Modifier::Equals => DateCriterion::Equals(expect_date(field, &input.value)?),
            Modifier::NotEquals => {
                DateCriterion::NotEquals(expect_date(field, &input.value)?)
            }
            Modifier::GreaterThan => {
                DateCriterion::GreaterThan(expect_date(field, &input.value)?)
            }
            Modifier::LessThan => {
                DateCriterion::LessThan(expect_date(field, &input.value)?)
            }
            Modifier::Between => {
                let (lo, hi) = expect_date_pair(field, &input.value)?;
                DateCriterion::Between(lo, hi)
            }
            Modifier::NotBetween => {
                let (lo, hi) = expect_date_pair(field, &input.value)?;
                DateCriterion::NotBetween(lo, hi)
            }
            Modifier::IsNull => DateCriterion::IsNull,
            Modifier::NotNull => DateCriterion::NotNull,
            _ => return Ok(None),
        };
        Ok(Some(criterion))
    }
}

/// Set-membership mode over a many-to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// At least one of the requested entities is related.
    Includes,
    /// Every requested entity is related (set containment, not overlap).
    IncludesAll,
    /// None of the requested entities is related.
    Excludes,
}

/// Set membership against a related entity set, optionally expanded
/// through a hierarchy before compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCriterion {
    pub mode: SetMode,
    pub keys: Vec<EntityKey>,
    pub depth: Option<i32>,
}

impl RelationCriterion {
    pub fn from_input(
        field: &str,
        input: &CriterionInput,
    ) -> Result<Option<Self>, ModelError> {
        let mode = match Modifier::parse(&input.modifier) {
            Some(Modifier::Includes) => SetMode::Includes,
            Some(Modifier::IncludesAll) => SetMode::IncludesAll,
            Some(Modifier::Excludes) => SetMode::Excludes,
            _ => return Ok(None),
        };
        let keys = expect_keys(field, &input.value)?;
        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(RelationCriterion {
            mode,
            keys,
            depth: input.depth,
        }))
    }
}

/// Scene filter bag. Absent fields compile to no predicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneFilter {
    pub title: Option<CriterionInput>,
    pub details: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub o_count: Option<CriterionInput>,
    pub play_count: Option<CriterionInput>,
    pub date: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub organized: Option<bool>,
    pub tags: Option<CriterionInput>,
    pub performers: Option<CriterionInput>,
    pub studios: Option<CriterionInput>,
    pub galleries: Option<CriterionInput>,
    pub groups: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformerFilter {
    pub name: Option<CriterionInput>,
    pub details: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub o_count: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioFilter {
    pub name: Option<CriterionInput>,
    pub details: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagFilter {
    pub name: Option<CriterionInput>,
    pub description: Option<CriterionInput>,
    pub favorite: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleryFilter {
    pub title: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub date: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
    pub performers: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupFilter {
    pub name: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub date: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageFilter {
    pub title: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub o_count: Option<CriterionInput>,
    pub date: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
    pub performers: Option<CriterionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipFilter {
    pub title: Option<CriterionInput>,
    pub rating: Option<CriterionInput>,
    pub date: Option<CriterionInput>,
    pub favorite: Option<bool>,
    pub tags: Option<CriterionInput>,
}

/// Tagged union over the per-kind filter bags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityFilter {
    Scene(SceneFilter),
    Performer(PerformerFilter),
    Studio(StudioFilter),
    Tag(TagFilter),
    Gallery(GalleryFilter),
    Group(GroupFilter),
    Image(ImageFilter),
    Clip(ClipFilter),
}

impl EntityFilter {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityFilter::Scene(_) => EntityKind::Scene,
            EntityFilter::Performer(_) => EntityKind::Performer,
            EntityFilter::Studio(_) => EntityKind::Studio,
            EntityFilter::Tag(_) => EntityKind::Tag,
            EntityFilter::Gallery(_) => EntityKind::Gallery,
            EntityFilter::Group(_) => EntityKind::Group,
            EntityFilter::Image(_) => EntityKind::Image,
            EntityFilter::Clip(_) => EntityKind::Clip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_modifier_parses_to_none() {
        let input = CriterionInput::new("MATCHES_REGEX", json!(5));
        assert_eq!(NumericCriterion::from_input("rating", &input).unwrap(), None);
        assert_eq!(TextCriterion::from_input("title", &input).unwrap(), None);
        assert!(RelationCriterion::from_input("tags", &input)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_value_set_parses_to_none() {
        let input = CriterionInput::new("INCLUDES", json!([]));
        assert!(RelationCriterion::from_input("tags", &input)
            .unwrap()
            .is_none());
    }

    #[test]
    fn malformed_numeric_value_is_an_error() {
        let input = CriterionInput::new("GREATER_THAN", json!("eighty"));
        let err = NumericCriterion::from_input("rating", &input).unwrap_err();
        assert!(matches!(err, ModelError::InvalidFilterValue { .. }));
    }

    #[test]
    fn between_requires_a_pair() {
        let input = CriterionInput::new("BETWEEN", json!([10]));
        assert!(NumericCriterion::from_input("rating", &input).is_err());

        let input = CriterionInput::new("BETWEEN", json!([10, 20]));
        assert_eq!(
            NumericCriterion::from_input("rating", &input).unwrap(),
            Some(NumericCriterion::Between(10.0, 20.0))
        );
    }

    #[test]
    fn relation_keys_accept_bare_and_composite_forms() {
        let input = CriterionInput::new(
            "INCLUDES_ALL",
            json!(["12", {"id": "12", "instance": "alpha"}]),
        );
        let criterion = RelationCriterion::from_input("tags", &input)
            .unwrap()
            .unwrap();
        assert_eq!(criterion.mode, SetMode::IncludesAll);
        assert_eq!(criterion.keys[0], EntityKey::legacy("12"));
        assert_eq!(criterion.keys[1], EntityKey::new("12", "alpha"));
    }

    #[test]
    fn dates_parse_on_the_day_grain() {
        let input = CriterionInput::new("EQUALS", json!("2024-03-09"));
        let criterion = DateCriterion::from_input("date", &input).unwrap().unwrap();
        assert_eq!(
            criterion,
            DateCriterion::Equals(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
        );

        let input = CriterionInput::new("EQUALS", json!("03/09/2024"));
        assert!(DateCriterion::from_input("date", &input).is_err());
    }
}
