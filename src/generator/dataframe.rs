//! Data-frame scripts (pandas and PySpark).
//!
//! Both targets share the same step order and the aggregate/plain split of
//! the SELECT list; a [`FrameSyntax`] supplies the spelling of each step.

use crate::query_model::{
    is_quoted, parse_condition, split_table_name, strip_alias_prefixes, ClauseKind, CompareOp,
    Condition, JoinFragment, JoinType, Query, Session, SortType,
};

use super::mongo::parse_limit;
use super::{split_aggregates, split_alias, strip_alias, Aggregate, GeneratorError, Renderer};

/// A join step with its key columns resolved.
#[derive(Debug, Clone)]
pub struct FrameJoin {
    pub table: String,
    pub alias: String,
    pub how: JoinType,
    /// `(left column, right column)`; `None` for a cross join
    pub keys: Option<((String, String), (String, String))>,
}

pub trait FrameSyntax: Default {
    const LANGUAGE: &'static str;

    fn header(&self) -> &'static str;
    fn source(&self, table: &str, alias: &str) -> String;
    fn join(&self, join: &FrameJoin) -> String;
    /// `None` when the condition has no equivalent.
    fn filter(&self, conditions: &[String]) -> Option<String>;
    fn group(&self, keys: &[String], aggregates: &[Aggregate]) -> String;
    fn aggregate_all(&self, aggregates: &[Aggregate]) -> String;
    fn select(&self, fields: &[(String, Option<String>)]) -> String;
    fn order(&self, fields: &[(String, SortType)]) -> String;
    fn limit(&self, count: u64, offset: u64) -> String;
}

pub struct DataFrameRenderer<'a, S: FrameSyntax> {
    query: &'a Query,
    session: &'a Session,
    syntax: S,
}

pub type PandasRenderer<'a> = DataFrameRenderer<'a, Pandas>;
pub type SparkRenderer<'a> = DataFrameRenderer<'a, Spark>;

impl<'a, S: FrameSyntax> DataFrameRenderer<'a, S> {
    pub fn new(query: &'a Query, session: &'a Session) -> Self {
        Self {
            query,
            session,
            syntax: S::default(),
        }
    }

    fn frame_join(&self, source: &str) -> Result<FrameJoin, GeneratorError> {
        if let Some(rest) = source.strip_prefix(',') {
            let (table, alias) = split_table_name(rest, self.session);
            return Ok(FrameJoin {
                table,
                alias,
                how: JoinType::Inner,
                keys: None,
            });
        }
        let join = JoinFragment::parse(source).ok_or_else(|| self.unsupported(source))?;
        let (first, second) = join.key_pair().ok_or_else(|| self.unsupported(source))?;
        // the right-hand key belongs to the joined table
        let keys = if first.0.eq_ignore_ascii_case(&join.alias) {
            (second, first)
        } else {
            (first, second)
        };
        Ok(FrameJoin {
            table: join.table,
            alias: join.alias,
            how: join.join_type,
            keys: Some(keys),
        })
    }
}

impl<S: FrameSyntax> Renderer for DataFrameRenderer<'_, S> {
    fn language(&self) -> &'static str {
        S::LANGUAGE
    }

    fn query(&self) -> &Query {
        self.query
    }

    fn keywords(&self) -> &'static [ClauseKind] {
        &[
            ClauseKind::From,
            ClauseKind::Where,
            ClauseKind::GroupBy,
            ClauseKind::Select,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
        ]
    }

    fn has_default(&self, kind: ClauseKind) -> bool {
        kind == ClauseKind::From
    }

    fn format_clause(&mut self, kind: ClauseKind, values: &[String]) -> Result<String, GeneratorError> {
        let mut steps = Vec::new();
        match kind {
            ClauseKind::From => {
                steps.push(self.syntax.header().to_string());
                steps.push(
                    self.syntax
                        .source(self.query.table_name(), self.query.alias()),
                );
                for source in values.iter().skip(1) {
                    let join = self.frame_join(source)?;
                    steps.push(self.syntax.join(&join));
                }
            }
            ClauseKind::Where => {
                for text in values {
                    if parse_condition(text).is_none() {
                        return Err(self.unsupported(text));
                    }
                }
                let step = self
                    .syntax
                    .filter(values)
                    .ok_or_else(|| self.unsupported(&values.join(" AND ")))?;
                steps.push(step);
            }
            ClauseKind::GroupBy => {
                let (aggregates, _) = split_aggregates(self.query.values(ClauseKind::Select));
                steps.push(self.syntax.group(values, &aggregates));
            }
            ClauseKind::Select => {
                let (aggregates, plain) = split_aggregates(values);
                let grouped = !self.query.is_empty(ClauseKind::GroupBy);
                if !grouped && !aggregates.is_empty() {
                    steps.push(self.syntax.aggregate_all(&aggregates));
                }
                let mut columns = Vec::new();
                for field in &plain {
                    let (expr, alias) = split_alias(field);
                    if expr.trim() == "*" {
                        continue;
                    }
                    if !expr
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
                    {
                        return Err(GeneratorError::UnsupportedField {
                            language: S::LANGUAGE.to_string(),
                            field: field.clone(),
                        });
                    }
                    columns.push((expr, alias));
                }
                if grouped || !aggregates.is_empty() {
                    columns.extend(
                        aggregates
                            .iter()
                            .map(|aggregate| (aggregate.output_name(), None)),
                    );
                }
                if !columns.is_empty() && (grouped || aggregates.is_empty()) {
                    steps.push(self.syntax.select(&columns));
                }
            }
            ClauseKind::OrderBy => {
                let fields: Vec<(String, SortType)> = values
                    .iter()
                    .map(|value| {
                        let (field, sort) = SortType::split_fragment(value);
                        (field.to_string(), sort)
                    })
                    .collect();
                steps.push(self.syntax.order(&fields));
            }
            ClauseKind::Limit => {
                let text = values.first().cloned().unwrap_or_default();
                let (count, offset) = parse_limit(&text).ok_or_else(|| self.unsupported(&text))?;
                steps.push(self.syntax.limit(count, offset));
            }
        }
        Ok(steps.join("\n"))
    }

    fn assemble(&mut self, parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError> {
        let lines: Vec<String> = parts
            .into_iter()
            .map(|(_, text)| text)
            .filter(|text| !text.is_empty())
            .collect();
        Ok(lines.join("\n"))
    }
}

/// pandas: a single `df` variable rewritten step by step.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pandas;

impl Pandas {
    fn column(field: &str) -> String {
        format!("df['{}']", strip_alias(field.trim()))
    }

    fn operand(value: &str) -> String {
        let value = value.trim();
        if is_quoted(value) || value.parse::<f64>().is_ok() {
            value.to_string()
        } else {
            Self::column(value)
        }
    }

    fn mask(condition: &Condition) -> Option<String> {
        let text = match condition {
            Condition::Compare { field, op, value } => {
                let op = match op {
                    CompareOp::Eq => "==",
                    CompareOp::Ne => "!=",
                    other => other.symbol(),
                };
                format!("({} {} {})", Self::column(field), op, Self::operand(value))
            }
            Condition::In {
                field,
                values,
                negated,
            } => format!(
                "{}{}.isin([{}])",
                if *negated { "~" } else { "" },
                Self::column(field),
                values.join(", ")
            ),
            Condition::Between { field, low, high } => {
                format!("{}.between({}, {})", Self::column(field), low, high)
            }
            Condition::IsNull { field, negated } => format!(
                "{}.{}()",
                Self::column(field),
                if *negated { "notna" } else { "isna" }
            ),
            Condition::Like {
                field,
                pattern,
                negated,
            } => {
                let core = pattern.trim_matches('%');
                let method = match (pattern.starts_with('%'), pattern.ends_with('%')) {
                    (true, true) => "contains",
                    (false, true) => "startswith",
                    (true, false) => "endswith",
                    (false, false) => "fullmatch",
                };
                format!(
                    "{}{}.str.{}('{}')",
                    if *negated { "~" } else { "" },
                    Self::column(field),
                    method,
                    core
                )
            }
            Condition::Or(parts) => {
                let parts = parts.iter().map(Self::mask).collect::<Option<Vec<_>>>()?;
                format!("({})", parts.join(" | "))
            }
            Condition::And(parts) => {
                let parts = parts.iter().map(Self::mask).collect::<Option<Vec<_>>>()?;
                format!("({})", parts.join(" & "))
            }
            Condition::Not(inner) => format!("~{}", Self::mask(inner)?),
        };
        Some(text)
    }

    fn function(name: &str) -> &str {
        match name {
            "avg" => "mean",
            "count" => "size",
            other => other,
        }
    }
}

impl FrameSyntax for Pandas {
    const LANGUAGE: &'static str = "pandas";

    fn header(&self) -> &'static str {
        "import pandas as pd"
    }

    fn source(&self, table: &str, _alias: &str) -> String {
        format!("df = pd.read_csv('{}.csv')", table)
    }

    fn join(&self, join: &FrameJoin) -> String {
        let right = format!("pd.read_csv('{}.csv')", join.table);
        match &join.keys {
            None => format!("df = df.merge({}, how='cross')", right),
            Some(((_, left_on), (_, right_on))) => {
                let how = match join.how {
                    JoinType::Inner => "inner",
                    JoinType::Left => "left",
                    JoinType::Right => "right",
                    JoinType::Full => "outer",
                };
                format!(
                    "df = df.merge({}, left_on='{}', right_on='{}', how='{}')",
                    right, left_on, right_on, how
                )
            }
        }
    }

    fn filter(&self, conditions: &[String]) -> Option<String> {
        let masks = conditions
            .iter()
            .map(|text| parse_condition(text).and_then(|c| Self::mask(&c)))
            .collect::<Option<Vec<_>>>()?;
        Some(format!("df = df[{}]", masks.join(" & ")))
    }

    fn group(&self, keys: &[String], aggregates: &[Aggregate]) -> String {
        let keys: Vec<String> = keys
            .iter()
            .map(|k| format!("'{}'", strip_alias(k)))
            .collect();
        let first_key = keys.first().cloned().unwrap_or_default();
        let mut named: Vec<String> = aggregates
            .iter()
            .map(|aggregate| {
                let column = if aggregate.argument == "*" {
                    first_key.clone()
                } else {
                    format!("'{}'", strip_alias(&aggregate.argument))
                };
                format!(
                    "{}=({}, '{}')",
                    aggregate.output_name(),
                    column,
                    Self::function(&aggregate.function)
                )
            })
            .collect();
        if named.is_empty() {
            named.push(format!("count=({}, 'size')", first_key));
        }
        format!(
            "df = df.groupby([{}]).agg({}).reset_index()",
            keys.join(", "),
            named.join(", ")
        )
    }

    fn aggregate_all(&self, aggregates: &[Aggregate]) -> String {
        let columns: Vec<String> = aggregates
            .iter()
            .map(|aggregate| {
                let value = if aggregate.argument == "*" {
                    "len(df)".to_string()
                } else {
                    format!(
                        "{}.{}()",
                        Self::column(&aggregate.argument),
                        Self::function(&aggregate.function)
                    )
                };
                format!("'{}': [{}]", aggregate.output_name(), value)
            })
            .collect();
        format!("df = pd.DataFrame({{{}}})", columns.join(", "))
    }

    fn select(&self, fields: &[(String, Option<String>)]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|(field, _)| format!("'{}'", strip_alias(field)))
            .collect();
        let mut text = format!("df = df[[{}]]", columns.join(", "));
        let renames: Vec<String> = fields
            .iter()
            .filter_map(|(field, alias)| {
                alias
                    .as_ref()
                    .map(|alias| format!("'{}': '{}'", strip_alias(field), alias))
            })
            .collect();
        if !renames.is_empty() {
            text.push_str(&format!(".rename(columns={{{}}})", renames.join(", ")));
        }
        text
    }

    fn order(&self, fields: &[(String, SortType)]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|(field, _)| format!("'{}'", strip_alias(field)))
            .collect();
        let ascending: Vec<&str> = fields
            .iter()
            .map(|(_, sort)| if *sort == SortType::Desc { "False" } else { "True" })
            .collect();
        format!(
            "df = df.sort_values([{}], ascending=[{}])",
            columns.join(", "),
            ascending.join(", ")
        )
    }

    fn limit(&self, count: u64, offset: u64) -> String {
        if offset > 0 {
            format!("df = df.iloc[{}:{}]", offset, offset + count)
        } else {
            format!("df = df.head({})", count)
        }
    }
}

/// PySpark: tables keep their SQL aliases through `.alias()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spark;

impl Spark {
    fn column(field: &str) -> String {
        format!("F.col('{}')", field.trim())
    }
}

impl FrameSyntax for Spark {
    const LANGUAGE: &'static str = "spark";

    fn header(&self) -> &'static str {
        "from pyspark.sql import functions as F"
    }

    fn source(&self, table: &str, alias: &str) -> String {
        format!("df = spark.table('{}').alias('{}')", table, alias)
    }

    fn join(&self, join: &FrameJoin) -> String {
        let right = format!("spark.table('{}').alias('{}')", join.table, join.alias);
        match &join.keys {
            None => format!("df = df.crossJoin({})", right),
            Some(((left_alias, left_on), (right_alias, right_on))) => {
                let how = match join.how {
                    JoinType::Inner => "inner",
                    JoinType::Left => "left",
                    JoinType::Right => "right",
                    JoinType::Full => "full",
                };
                format!(
                    "df = df.join({}, {} == {}, '{}')",
                    right,
                    Self::column(&format!("{}.{}", left_alias, left_on)),
                    Self::column(&format!("{}.{}", right_alias, right_on)),
                    how
                )
            }
        }
    }

    fn filter(&self, conditions: &[String]) -> Option<String> {
        let text = conditions.join(" AND ").replace('"', "\\\"");
        Some(format!("df = df.filter(\"{}\")", text))
    }

    fn group(&self, keys: &[String], aggregates: &[Aggregate]) -> String {
        let keys: Vec<String> = keys.iter().map(|k| format!("'{}'", k.trim())).collect();
        let mut calls: Vec<String> = aggregates.iter().map(spark_aggregate).collect();
        if calls.is_empty() {
            calls.push("F.count('*').alias('count')".to_string());
        }
        format!("df = df.groupBy({}).agg({})", keys.join(", "), calls.join(", "))
    }

    fn aggregate_all(&self, aggregates: &[Aggregate]) -> String {
        let calls: Vec<String> = aggregates.iter().map(spark_aggregate).collect();
        format!("df = df.agg({})", calls.join(", "))
    }

    fn select(&self, fields: &[(String, Option<String>)]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|(field, alias)| match alias {
                Some(alias) => format!("{}.alias('{}')", Self::column(field), alias),
                None if field.contains('.') => format!("'{}'", field),
                // aggregate outputs are plain column names after groupBy
                None => format!("'{}'", strip_alias_prefixes(field, None)),
            })
            .collect();
        format!("df = df.select({})", columns.join(", "))
    }

    fn order(&self, fields: &[(String, SortType)]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|(field, sort)| match sort {
                SortType::Desc => format!("{}.desc()", Self::column(field)),
                SortType::Asc => Self::column(field),
            })
            .collect();
        format!("df = df.orderBy({})", columns.join(", "))
    }

    fn limit(&self, count: u64, offset: u64) -> String {
        if offset > 0 {
            format!("df = df.offset({}).limit({})", offset, count)
        } else {
            format!("df = df.limit({})", count)
        }
    }
}

fn spark_aggregate(aggregate: &Aggregate) -> String {
    let argument = if aggregate.argument == "*" {
        "'*'".to_string()
    } else {
        format!("'{}'", aggregate.argument)
    };
    format!(
        "F.{}({}).alias('{}')",
        aggregate.function,
        argument,
        aggregate.output_name()
    )
}
