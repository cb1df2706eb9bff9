//! Filtered, sorted, paginated views over the catalog mirror.
//!
//! The pipeline is compile → plan → execute: filter bags compile into a
//! [`predicate::Predicate`] tree, the planner lowers the tree plus the
//! per-user overlay join, exclusion anti-join, and instance visibility
//! into a [`sqlx::QueryBuilder`] pair (data and count), and the executor
//! runs both concurrently.

pub mod compile;
pub mod hierarchy;
pub mod planner;
pub mod predicate;
pub mod sort;

pub use compile::{compile, CompileContext};
pub use hierarchy::Hierarchy;
pub use planner::{Page, QueryEngine, QueryOptions};
pub use predicate::Predicate;
