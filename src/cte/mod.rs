//! Common table expressions: `WITH name AS (q1 UNION ALL q2 ...) main`.
//!
//! [`Recursive`] builds `WITH RECURSIVE` blocks whose step queries read the
//! CTE itself. [`CteFactory`] pulls aliased sub-selects out of a SQL
//! statement into named CTEs.

use std::sync::LazyLock;

use regex::Regex;

use crate::expression::{qualify_condition, Value, Where};
use crate::query_model::normalize::named_field_alias;
use crate::query_model::{split_table_name, strip_alias_prefixes, ClauseKind, Query, Session};

mod errors;
mod factory;

pub use errors::CteError;
pub use factory::CteFactory;

static TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\w.]+)\s*\((.*)\)\s*$").unwrap());
static POSITION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// `Table(field, *key, ...)`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TablePattern {
    pub table: String,
    pub fields: Vec<String>,
    pub key: Option<String>,
}

impl TablePattern {
    pub fn parse(text: &str) -> Result<Self, CteError> {
        let captures = TABLE_PATTERN
            .captures(text)
            .ok_or_else(|| CteError::InvalidPattern(text.to_string()))?;
        let mut fields = Vec::new();
        let mut key = None;
        for field in captures[2].split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if field.starts_with('*') || field.ends_with('*') {
                key = Some(field.trim_matches('*').trim().to_string());
            } else {
                fields.push(field.to_string());
            }
        }
        if fields.is_empty() && key.is_none() {
            return Err(CteError::InvalidPattern(text.to_string()));
        }
        Ok(Self {
            table: captures[1].to_string(),
            fields,
            key,
        })
    }

    /// Lower-case first letter of the table, the prefix of numbered aliases.
    fn alias_prefix(&self) -> String {
        self.table
            .chars()
            .next()
            .map(|c| c.to_lowercase().to_string())
            .unwrap_or_default()
    }
}

/// Replace every `[n]` (1-based) with the n-th of `fields`.
pub(crate) fn resolve_positions(template: &str, fields: &[String]) -> Result<String, CteError> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;
    for captures in POSITION.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let position: usize = captures[1].parse().unwrap_or(0);
        let field = position
            .checked_sub(1)
            .and_then(|i| fields.get(i))
            .ok_or(CteError::UnknownPosition {
                position,
                count: fields.len(),
            })?;
        result.push_str(&template[last..whole.start()]);
        result.push_str(field);
        last = whole.end();
    }
    result.push_str(&template[last..]);
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct Cte {
    table_name: String,
    alias: String,
    queries: Vec<Query>,
    main: Query,
    recursive: bool,
}

impl Cte {
    /// `name` is `"table alias"` or a bare table; the main query starts as
    /// `SELECT * FROM table alias`.
    pub fn new(name: &str, queries: Vec<Query>, session: &Session) -> Self {
        let (table_name, alias) = split_table_name(name, session);
        let main = Query::new(&format!("{} {}", table_name, alias), session);
        Self {
            table_name,
            alias,
            queries,
            main,
            recursive: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn main(&self) -> &Query {
        &self.main
    }

    pub fn main_mut(&mut self) -> &mut Query {
        &mut self.main
    }

    pub fn set_main(&mut self, main: Query) {
        self.main = main;
    }

    /// Output column names of the CTE, taken from its first query.
    pub fn field_names(&self) -> Vec<String> {
        let Some(first) = self.queries.first() else {
            return Vec::new();
        };
        first
            .values(ClauseKind::Select)
            .iter()
            .map(|field| match named_field_alias(field) {
                Some(alias) => alias.to_string(),
                None => strip_alias_prefixes(field.trim(), None),
            })
            .collect()
    }

    /// Join the lookup table of `pattern` once per field of `fields`, aliased
    /// `x1`, `x2`, ... and select its non-key fields instead of `*`.
    ///
    /// `cte.join("Airport(*id, name)", "departure, arrival", ".csv")`
    pub fn join(&mut self, pattern: &str, fields: &str, extension: &str) -> Result<&mut Self, CteError> {
        let pattern = TablePattern::parse(pattern)?;
        let key = pattern
            .key
            .clone()
            .ok_or_else(|| CteError::MissingKey(pattern.table.clone()))?;
        let prefix = pattern.alias_prefix();
        let table = format!("{}{}", pattern.table, extension);
        for (i, field) in fields.split(',').map(str::trim).filter(|f| !f.is_empty()).enumerate() {
            let alias = format!("{}{}", prefix, i + 1);
            self.main.push(
                ClauseKind::From,
                format!("JOIN {} {} ON ({}.{} = {}.{})", table, alias, self.alias, field, alias, key),
            );
            for selected in &pattern.fields {
                self.main.push(ClauseKind::Select, format!("{}.{}", alias, selected));
            }
        }
        log::debug!("{} joined {} time(s) into {}", table, fields.split(',').count(), self.table_name);
        Ok(self)
    }

    /// `name AS (q1 UNION ALL q2 ...)`
    fn definition(&self, session: &Session) -> String {
        let break_lines = session.config().break_lines;
        let branches: Vec<String> = self
            .queries
            .iter()
            .map(|query| {
                let text = query.to_sql(session);
                if break_lines {
                    text.lines().map(|line| format!("\t{}", line)).collect::<Vec<_>>().join("\n")
                } else {
                    text
                }
            })
            .collect();
        if break_lines {
            format!("{} AS (\n{}\n)", self.table_name, branches.join("\nUNION ALL\n"))
        } else {
            format!("{} AS ({})", self.table_name, branches.join(" UNION ALL "))
        }
    }

    pub fn render(&self, session: &Session) -> String {
        let separator = if session.config().break_lines { "\n" } else { " " };
        format!(
            "WITH {}{}{}{}",
            if self.recursive { "RECURSIVE " } else { "" },
            self.definition(session),
            separator,
            self.main.to_sql(session)
        )
    }
}

/// `WITH RECURSIVE`: every query after the seed also reads the CTE.
#[derive(Debug, Clone)]
pub struct Recursive {
    cte: Cte,
}

impl Recursive {
    pub fn new(name: &str, mut queries: Vec<Query>, session: &Session) -> Self {
        let mut cte = Cte::new(name, Vec::new(), session);
        cte.recursive = true;
        let source = format!(", {} {}", cte.table_name, cte.alias);
        for step in queries.iter_mut().skip(1) {
            step.push(ClauseKind::From, source.clone());
        }
        cte.queries = queries;
        Self { cte }
    }

    /// Seed and step queries over one repeated table.
    ///
    /// `pattern` lists the fields (`Flight(departure, arrival)`), the seed
    /// keeps rows whose first field equals `seed`, and `formula` is the
    /// step's join condition with `[n]` standing for the n-th field:
    /// `Recursive::create("Route R", "Flight(departure, arrival)", "[2] = R.[1]", "JFK", ".csv", &session)`.
    pub fn create(
        name: &str,
        pattern: &str,
        formula: &str,
        seed: impl Into<Value>,
        extension: &str,
        session: &Session,
    ) -> Result<Self, CteError> {
        let pattern = TablePattern::parse(pattern)?;
        let table = format!("{}{}", pattern.table, extension);
        let prefix = pattern.alias_prefix();
        let fields: Vec<&str> = pattern.fields.iter().map(String::as_str).collect();
        let first = fields
            .first()
            .ok_or_else(|| CteError::InvalidPattern(pattern.table.clone()))?;

        let mut queries = Vec::with_capacity(2);
        for i in 1..=2 {
            let mut query = Query::new(&format!("{} {}{}", table, prefix, i), session);
            query.add_fields(&fields, false, false, session)?;
            queries.push(query);
        }
        queries[0].apply(first, &Where::eq(seed)?, session)?;
        let condition = resolve_positions(formula, &pattern.fields)?;
        let condition = qualify_condition(&condition, &queries[1]);
        queries[1].push(ClauseKind::Where, condition);
        Ok(Self::new(name, queries, session))
    }

    /// Add a `name` column starting at `start` on the seed and changed by
    /// `increment` (`"+ 1"`, `"- 1"`) on every step.
    pub fn counter(&mut self, name: &str, start: i64, increment: &str) -> &mut Self {
        let alias = self.cte.alias.clone();
        for (i, query) in self.cte.queries.iter_mut().enumerate() {
            let field = if i == 0 {
                format!("{} as {}", start, name)
            } else {
                format!("({}.{} {}) as {}", alias, name, increment.trim(), name)
            };
            query.push(ClauseKind::Select, field);
        }
        self
    }

    pub fn join(&mut self, pattern: &str, fields: &str, extension: &str) -> Result<&mut Self, CteError> {
        self.cte.join(pattern, fields, extension)?;
        Ok(self)
    }

    pub fn cte(&self) -> &Cte {
        &self.cte
    }

    pub fn cte_mut(&mut self) -> &mut Cte {
        &mut self.cte
    }

    pub fn render(&self, session: &Session) -> String {
        self.cte.render(session)
    }
}
