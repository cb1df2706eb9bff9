//! Predicate intermediate representation.
//!
//! Compiled filters are AND/OR trees whose leaves are SQL fragments with
//! ordered bound values. A separate lowering step renders the tree into a
//! [`sqlx::QueryBuilder`], interleaving `push_bind` calls — user-supplied
//! values never appear in query text.

use chrono::NaiveDate;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// A value bound into a fragment placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextArray(Vec<String>),
    Date(NaiveDate),
    Uuid(Uuid),
}

/// Side-effect-free predicate tree. `All(vec![])` is the vacuous "no
/// predicate" and renders as TRUE.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    /// Raw fragment with one `?` placeholder per bind, in order.
    Fragment { sql: String, binds: Vec<Bind> },
}

impl Predicate {
    pub fn none() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn fragment(sql: impl Into<String>, binds: Vec<Bind>) -> Self {
        Predicate::Fragment {
            sql: sql.into(),
            binds,
        }
    }

    pub fn is_vacuous(&self) -> bool {
        match self {
            Predicate::All(children) => children.iter().all(Predicate::is_vacuous),
            _ => false,
        }
    }

    /// Appends `other`, flattening nested ANDs and dropping vacuous
    /// children so compiled SQL stays readable.
    pub fn and(self, other: Predicate) -> Predicate {
        if other.is_vacuous() {
            return self;
        }
        match self {
            Predicate::All(mut children) => {
                children.push(other);
                Predicate::All(children)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    /// Renders the tree into the builder, parenthesized.
    pub fn push_to(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Predicate::All(children) => {
                let live: Vec<_> =
                    children.iter().filter(|c| !c.is_vacuous()).collect();
                if live.is_empty() {
                    qb.push("TRUE");
                    return;
                }
                qb.push("(");
                for (i, child) in live.iter().enumerate() {
                    if i > 0 {
                        qb.push(" AND ");
                    }
                    child.push_to(qb);
                }
                qb.push(")");
            }
            Predicate::Any(children) => {
                if children.is_empty() {
                    qb.push("FALSE");
                    return;
                }
                qb.push("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    child.push_to(qb);
                }
                qb.push(")");
            }
            Predicate::Fragment { sql, binds } => {
                push_fragment(qb, sql, binds);
            }
        }
    }

    /// Display form with `$n` markers in bind order, for assertions and
    /// trace logging. Not executable.
    pub fn display_sql(&self) -> String {
        let mut out = String::new();
        let mut counter = 1usize;
        self.display_into(&mut out, &mut counter);
        out
    }

    fn display_into(&self, out: &mut String, counter: &mut usize) {
        match self {
            Predicate::All(children) => {
                let live: Vec<_> =
                    children.iter().filter(|c| !c.is_vacuous()).collect();
                if live.is_empty() {
                    out.push_str("TRUE");
                    return;
                }
                out.push('(');
                for (i, child) in live.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" AND ");
                    }
                    child.display_into(out, counter);
                }
                out.push(')');
            }
            Predicate::Any(children) => {
                if children.is_empty() {
                    out.push_str("FALSE");
                    return;
                }
                out.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" OR ");
                    }
                    child.display_into(out, counter);
                }
                out.push(')');
            }
            Predicate::Fragment { sql, .. } => {
                let pieces: Vec<&str> = sql.split('?').collect();
                for (i, piece) in pieces.iter().enumerate() {
                    out.push_str(piece);
                    if i + 1 < pieces.len() {
                        out.push_str(&format!("${counter}"));
                        *counter += 1;
                    }
                }
            }
        }
    }
}

fn count_placeholders(sql: &str) -> usize {
    sql.matches('?').count()
}

/// Interleaves fragment text with `push_bind` calls, one per `?`.
pub fn push_fragment(
    qb: &mut QueryBuilder<'_, Postgres>,
    sql: &str,
    binds: &[Bind],
) {
    debug_assert_eq!(
        count_placeholders(sql),
        binds.len(),
        "fragment placeholder/bind count mismatch: {sql}"
    );
    let pieces: Vec<&str> = sql.split('?').collect();
    for (i, piece) in pieces.iter().enumerate() {
        qb.push(*piece);
        if let Some(bind) = binds.get(i) {
            match bind.clone() {
                Bind::Bool(v) => qb.push_bind(v),
                Bind::Int(v) => qb.push_bind(v),
                Bind::Float(v) => qb.push_bind(v),
                Bind::Text(v) => qb.push_bind(v),
                Bind::TextArray(v) => qb.push_bind(v),
                Bind::Date(v) => qb.push_bind(v),
                Bind::Uuid(v) => qb.push_bind(v),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacuous_predicate_renders_true() {
        let p = Predicate::none();
        assert!(p.is_vacuous());
        assert_eq!(p.display_sql(), "TRUE");

        let mut qb = QueryBuilder::new("SELECT 1 WHERE ");
        p.push_to(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn fragments_render_with_positional_markers() {
        let p = Predicate::none()
            .and(Predicate::fragment("e.rating > ?", vec![Bind::Float(80.0)]))
            .and(Predicate::Any(vec![
                Predicate::fragment("e.title ILIKE ?", vec![Bind::Text("%a%".into())]),
                Predicate::fragment("e.details ILIKE ?", vec![Bind::Text("%a%".into())]),
            ]));
        assert_eq!(
            p.display_sql(),
            "(e.rating > $1 AND (e.title ILIKE $2 OR e.details ILIKE $3))"
        );
    }

    #[test]
    fn lowering_binds_parameters_instead_of_inlining() {
        let p = Predicate::fragment(
            "e.instance_id = ANY(?)",
            vec![Bind::TextArray(vec!["alpha".into()])],
        );
        let mut qb = QueryBuilder::new("SELECT 1 WHERE ");
        p.push_to(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1 WHERE e.instance_id = ANY($1)");
    }

    #[test]
    fn and_drops_vacuous_children() {
        let p = Predicate::none().and(Predicate::none()).and(
            Predicate::fragment("e.organized = ?", vec![Bind::Bool(true)]),
        );
        assert_eq!(p.display_sql(), "(e.organized = $1)");
    }
}
