use crate::query_model::{ClauseKind, Query, Session};

use super::field::format_field;
use super::predicate::{Value, Where};
use super::{ExpressionError, Modifier};

/// `CASE WHEN field <cond> THEN result ... ELSE default END AS name`
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    field: String,
    conditions: Vec<(Where, Value)>,
    default: Option<Value>,
}

impl Case {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.trim().to_string(),
            conditions: Vec::new(),
            default: None,
        }
    }

    pub fn when(mut self, condition: Where, result: impl Into<Value>) -> Self {
        self.conditions.push((condition, result.into()));
        self
    }

    pub fn else_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn format(&self, name: &str, query: &Query, session: &Session) -> String {
        let (inner, outer) = if session.config().break_lines {
            ("\n\t\t", "\n\t")
        } else {
            (" ", " ")
        };
        let field = format_field(&self.field, query);
        let mut text = String::from("CASE");
        for (condition, result) in &self.conditions {
            text.push_str(&format!(
                "{}WHEN {} {} THEN {}",
                inner,
                field,
                condition.expr(),
                result.quoted()
            ));
        }
        if let Some(default) = &self.default {
            text.push_str(&format!("{}ELSE {}", inner, default.quoted()));
        }
        text.push_str(&format!("{}END AS {}", outer, name.trim()));
        text
    }
}

impl Modifier for Case {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = self.format(name, query, session);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// Contiguous inclusive buckets from `label -> upper bound`.
///
/// Buckets are sorted by upper bound; the first starts at 0 and each next
/// one starts right after the previous bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    case: Case,
}

impl Range {
    pub fn new(field: &str, buckets: &[(&str, i64)]) -> Self {
        let mut sorted = buckets.to_vec();
        sorted.sort_by_key(|(_, upper)| *upper);

        let mut case = Case::new(field);
        let mut start = 0;
        for (label, upper) in sorted {
            case = case.when(Where::between(start, upper), label);
            start = upper + 1;
        }
        Self { case }
    }

    pub fn else_value(mut self, default: impl Into<Value>) -> Self {
        self.case = self.case.else_value(default);
        self
    }
}

impl Modifier for Range {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        self.case.add(name, query, session)
    }
}
