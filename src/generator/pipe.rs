//! Pipe-syntax SQL: `FROM t |> WHERE ... |> AGGREGATE ... |> SELECT ...`.

use crate::query_model::{ClauseKind, Query, Session};

use super::{Aggregate, GeneratorError, Renderer};

pub struct PipeRenderer<'a> {
    query: &'a Query,
    break_lines: bool,
}

impl<'a> PipeRenderer<'a> {
    pub fn new(query: &'a Query, session: &'a Session) -> Self {
        Self {
            query,
            break_lines: session.config().break_lines,
        }
    }

    fn delimiter(&self) -> &'static str {
        if self.break_lines {
            "\n|> "
        } else {
            " |> "
        }
    }
}

impl Renderer for PipeRenderer<'_> {
    fn language(&self) -> &'static str {
        "pipe"
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
        let text = match kind {
            ClauseKind::From => {
                let mut steps = vec![format!("FROM {}", values.first().cloned().unwrap_or_default())];
                for source in values.iter().skip(1) {
                    match source.strip_prefix(',') {
                        Some(rest) => steps.push(format!("CROSS JOIN {}", rest.trim())),
                        None => steps.push(source.clone()),
                    }
                }
                steps.join(self.delimiter())
            }
            ClauseKind::Where => format!("WHERE {}", values.join(" AND ")),
            ClauseKind::GroupBy => {
                let calls = aggregate_calls(self.query.values(ClauseKind::Select));
                let calls = if calls.is_empty() {
                    "COUNT(*) AS count".to_string()
                } else {
                    calls.join(", ")
                };
                format!("AGGREGATE {} GROUP BY {}", calls, values.join(", "))
            }
            ClauseKind::Select => {
                if !self.query.is_empty(ClauseKind::GroupBy) {
                    return Ok(String::new());
                }
                let calls = aggregate_calls(values);
                if calls.is_empty() {
                    format!("SELECT {}", values.join(", "))
                } else {
                    format!("AGGREGATE {}", calls.join(", "))
                }
            }
            ClauseKind::OrderBy => format!("ORDER BY {}", values.join(", ")),
            ClauseKind::Limit => format!("LIMIT {}", values.join(" ")),
        };
        Ok(text)
    }

    fn assemble(&mut self, parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError> {
        let steps: Vec<String> = parts
            .into_iter()
            .map(|(_, text)| text)
            .filter(|text| !text.is_empty())
            .collect();
        Ok(steps.join(self.delimiter()))
    }
}

fn aggregate_calls(fields: &[String]) -> Vec<&str> {
    fields
        .iter()
        .filter(|field| Aggregate::parse(field).is_some())
        .map(String::as_str)
        .collect()
}
