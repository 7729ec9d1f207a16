//! The query intermediate representation.
//!
//! A [`Query`] is a table reference with ordered fragment lists per clause.
//! Parsers fill it, modifiers and rules edit it, generators render it. The
//! [`Session`] carries the state shared by several queries: configuration,
//! the alias hook and the foreign-key registry used by [`Query::merge`].

pub mod alias;
pub mod clause;
pub mod condition;
pub mod errors;
pub mod merge;
pub mod normalize;
pub mod query;
pub mod session;

pub use alias::{derive_alias, split_table_name};
pub use clause::{split_conditions, split_joins, split_top_level, ClauseKind, JoinType, SortType};
pub use condition::{is_quoted, parse_condition, unquote, CompareOp, Condition};
pub use errors::QueryModelError;
pub use normalize::{normalize_field, rename_alias, strip_alias_prefixes, JoinFragment};
pub use query::{Query, QueryRole};
pub use session::{AliasHook, ForeignKeyRegistry, Relationship, Session};
