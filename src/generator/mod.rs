//! Renderers turning a [`Query`] into target-language text.
//!
//! Every renderer walks an ordered list of clause kinds, formats each clause
//! that has fragments (or a default when empty), then assembles the parts.
//! SQL is infallible; the other targets reject fragments they cannot
//! express with [`GeneratorError`].

use std::fmt;
use std::str::FromStr;

use crate::expression::get_function;
use crate::query_model::normalize::{named_field_alias, strip_outer_parentheses};
use crate::query_model::{strip_alias_prefixes, ClauseKind, Query, Session};

pub mod dataframe;
mod errors;
pub mod mongo;
pub mod neo4j;
pub mod pipe;
pub mod sql;

pub use dataframe::{PandasRenderer, SparkRenderer};
pub use errors::GeneratorError;
pub use mongo::MongoRenderer;
pub use neo4j::Neo4jRenderer;
pub use pipe::PipeRenderer;
pub use sql::SqlRenderer;

pub trait Renderer {
    /// Target name used in error messages.
    fn language(&self) -> &'static str;

    fn query(&self) -> &Query;

    /// Clause kinds in output order.
    fn keywords(&self) -> &'static [ClauseKind];

    /// Whether `kind` is rendered even when the query has no fragment for it.
    fn has_default(&self, kind: ClauseKind) -> bool {
        kind == ClauseKind::Select
    }

    fn format_clause(&mut self, kind: ClauseKind, values: &[String]) -> Result<String, GeneratorError>;

    fn assemble(&mut self, parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError>;

    fn convert(&mut self) -> Result<String, GeneratorError> {
        let mut parts = Vec::new();
        for &kind in self.keywords() {
            let values = self.query().values(kind).to_vec();
            if values.is_empty() && !self.has_default(kind) {
                continue;
            }
            let text = self.format_clause(kind, &values)?;
            parts.push((kind, text));
        }
        self.assemble(parts)
    }

    fn unsupported(&self, condition: &str) -> GeneratorError {
        GeneratorError::UnsupportedCondition {
            language: self.language().to_string(),
            condition: condition.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Sql,
    MongoDb,
    Neo4j,
    Pipe,
    Pandas,
    Spark,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Sql,
        Language::MongoDb,
        Language::Neo4j,
        Language::Pipe,
        Language::Pandas,
        Language::Spark,
    ];

    pub fn render(&self, query: &Query, session: &Session) -> Result<String, GeneratorError> {
        log::trace!("rendering {} as {}", query.table_name(), self);
        match self {
            Language::Sql => SqlRenderer::new(query, session).convert(),
            Language::MongoDb => MongoRenderer::new(query, session).convert(),
            Language::Neo4j => Neo4jRenderer::new(query, session).convert(),
            Language::Pipe => PipeRenderer::new(query, session).convert(),
            Language::Pandas => PandasRenderer::new(query, session).convert(),
            Language::Spark => SparkRenderer::new(query, session).convert(),
        }
    }
}

impl FromStr for Language {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sql" => Ok(Language::Sql),
            "mongo" | "mongodb" => Ok(Language::MongoDb),
            "neo4j" | "cypher" => Ok(Language::Neo4j),
            "pipe" => Ok(Language::Pipe),
            "pandas" => Ok(Language::Pandas),
            "spark" | "pyspark" => Ok(Language::Spark),
            _ => Err(GeneratorError::UnknownLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Sql => "sql",
            Language::MongoDb => "mongodb",
            Language::Neo4j => "neo4j",
            Language::Pipe => "pipe",
            Language::Pandas => "pandas",
            Language::Spark => "spark",
        };
        f.write_str(name)
    }
}

/// Remove every `alias.` qualifier, for targets without table aliases.
pub fn strip_alias(text: &str) -> String {
    strip_alias_prefixes(text, None)
}

/// `expr AS name` split into its parts.
pub(crate) fn split_alias(field: &str) -> (String, Option<String>) {
    let field = field.trim();
    match named_field_alias(field) {
        Some(alias) => {
            let words = field.len() - alias.len();
            let expr = field[..words].trim_end();
            let expr = expr[..expr.len() - 2].trim_end();
            (expr.to_string(), Some(alias.to_string()))
        }
        None => (field.to_string(), None),
    }
}

/// An aggregate SELECT field such as `SUM(s.value) as total`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Aggregate {
    /// Lower-case function name (`sum`, `count`, ...)
    pub function: String,
    /// The argument, `*` for `COUNT(*)`
    pub argument: String,
    pub alias: Option<String>,
}

impl Aggregate {
    pub fn parse(field: &str) -> Option<Aggregate> {
        let (expr, alias) = split_alias(field);
        let open = expr.find('(')?;
        if !expr.ends_with(')') {
            return None;
        }
        let name = expr[..open].trim();
        let kind = get_function(name)?;
        if !kind.is_aggregate() || expr.contains(" OVER") {
            return None;
        }
        let argument = strip_outer_parentheses(&expr[open..]).trim();
        Some(Aggregate {
            function: kind.sql_name().to_lowercase(),
            argument: if argument.is_empty() {
                "*".to_string()
            } else {
                argument.to_string()
            },
            alias,
        })
    }

    /// Output column name: the alias, else `function_argument`.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None if self.argument == "*" => self.function.clone(),
            None => format!("{}_{}", self.function, strip_alias(&self.argument)),
        }
    }
}

/// SELECT fields split into aggregates and plain columns.
pub(crate) fn split_aggregates(fields: &[String]) -> (Vec<Aggregate>, Vec<String>) {
    let mut aggregates = Vec::new();
    let mut plain = Vec::new();
    for field in fields {
        match Aggregate::parse(field) {
            Some(aggregate) => aggregates.push(aggregate),
            None => plain.push(field.clone()),
        }
    }
    (aggregates, plain)
}
