//! WHERE / HAVING builders.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::query_model::{ClauseKind, Query, Session};

use super::field::format_field;
use super::function::{Function, FunctionKind};
use super::{ExpressionError, FieldFormat, Modifier};

/// A standalone "or" inside a literal, the classic `' OR 1=1` payload.
static INJECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bor\b").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    /// Expression copied verbatim (dates built by rules, sub-selects...)
    Raw(String),
}

impl Value {
    pub fn quoted(&self) -> String {
        match self {
            Value::Text(text) => format!("'{}'", text),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Raw(text) => text.clone(),
        }
    }

    fn check_injection(&self) -> Result<(), ExpressionError> {
        match self {
            Value::Text(text) if INJECTION_PATTERN.is_match(text) => {
                Err(ExpressionError::PossibleInjection(text.clone()))
            }
            _ => Ok(()),
        }
    }

    fn partial_cmp_value(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// Where the `%` goes in a LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wildcard {
    /// `%value`
    Start,
    /// `%value%`
    Middle,
    /// `value%`
    End,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    /// `<field> <expr>`
    Expr(String),
    /// Template with `{af}` / `%` placeholders, used as the whole condition
    Formula(String),
    /// Correlated source: the other query joins through the field
    Join(Box<Query>),
}

/// A condition on the field the modifier is attached to.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    prefix: &'static str,
    condition: Condition,
}

impl Where {
    /// Raw operator and operand, e.g. `Where::new("> 10")`.
    pub fn new(expr: &str) -> Self {
        Self {
            prefix: "",
            condition: Condition::Expr(expr.trim().to_string()),
        }
    }

    fn compare(operator: &str, value: Value) -> Self {
        Self::new(&format!("{} {}", operator, value.quoted()))
    }

    fn checked(operator: &str, value: Value) -> Result<Self, ExpressionError> {
        value.check_injection()?;
        Ok(Self::compare(operator, value))
    }

    pub fn eq(value: impl Into<Value>) -> Result<Self, ExpressionError> {
        Self::checked("=", value.into())
    }

    pub fn ne(value: impl Into<Value>) -> Result<Self, ExpressionError> {
        Self::checked("<>", value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::compare(">", value.into())
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::compare(">=", value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::compare("<", value.into())
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::compare("<=", value.into())
    }

    pub fn like(value: &str, wildcard: Wildcard) -> Result<Self, ExpressionError> {
        let pattern = match wildcard {
            Wildcard::Start => format!("%{}", value),
            Wildcard::Middle => format!("%{}%", value),
            Wildcard::End => format!("{}%", value),
        };
        Self::checked("LIKE", Value::Text(pattern))
    }

    pub fn contains(value: &str) -> Result<Self, ExpressionError> {
        Self::like(value, Wildcard::Middle)
    }

    pub fn is_null() -> Self {
        Self::new("IS NULL")
    }

    pub fn inside<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let list: Vec<String> = values.into_iter().map(|v| v.into().quoted()).collect();
        Self::new(&format!("IN ({})", list.join(",")))
    }

    pub fn between(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        let between = Between::new(start, end);
        Self::new(&format!("BETWEEN {} AND {}", between.start, between.end))
    }

    /// A whole condition from a template: `{af}`, `{a.f}` or `%` stand for
    /// `alias.field`, `{a}` for the alias, `{f}` for the field.
    pub fn formula(template: &str) -> Self {
        Self {
            prefix: "",
            condition: Condition::Formula(template.to_string()),
        }
    }

    /// Correlate with `other`: it becomes an extra FROM source, its key is
    /// matched against the field, and its conditions are added.
    pub fn join(other: Query) -> Self {
        Self {
            prefix: "",
            condition: Condition::Join(Box::new(other)),
        }
    }

    /// Operator and operand, as rendered after the field.
    pub fn expr(&self) -> &str {
        match &self.condition {
            Condition::Expr(expr) | Condition::Formula(expr) => expr,
            Condition::Join(_) => "",
        }
    }

    fn negated(mut self) -> Self {
        self.prefix = "NOT ";
        self
    }

    /// Condition text for `name` on `query`.
    pub fn format(&self, name: &str, query: &Query) -> String {
        match &self.condition {
            Condition::Expr(expr) => {
                format!("{}{} {}", self.prefix, format_field(name, query), expr)
            }
            Condition::Formula(template) => {
                let text = super::ExpressionField::new(template).format(name, query);
                format!("{}{}", self.prefix, text)
            }
            Condition::Join(other) => {
                let key = other.key_field().unwrap_or(name.trim());
                format!(
                    "{}{} = {}.{}",
                    self.prefix,
                    format_field(name, query),
                    other.alias(),
                    key
                )
            }
        }
    }
}

impl Modifier for Where {
    fn add(&self, name: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        if let Condition::Join(other) = &self.condition {
            query.push(ClauseKind::From, format!(", {} {}", other.table_name(), other.alias()));
            let condition = self.format(name, query);
            query.push(ClauseKind::Where, condition);
            query.update_values(ClauseKind::Where, other.values(ClauseKind::Where));
            return Ok(());
        }
        let condition = self.format(name, query);
        query.push(ClauseKind::Where, condition);
        Ok(())
    }
}

/// Negated builders: `NOT field <op> value`. `Not::eq` is written `<>`.
pub struct Not;

impl Not {
    pub fn eq(value: impl Into<Value>) -> Result<Where, ExpressionError> {
        Where::ne(value)
    }

    pub fn ne(value: impl Into<Value>) -> Result<Where, ExpressionError> {
        Ok(Where::eq(value)?.negated())
    }

    pub fn gt(value: impl Into<Value>) -> Where {
        Where::gt(value).negated()
    }

    pub fn gte(value: impl Into<Value>) -> Where {
        Where::gte(value).negated()
    }

    pub fn lt(value: impl Into<Value>) -> Where {
        Where::lt(value).negated()
    }

    pub fn lte(value: impl Into<Value>) -> Where {
        Where::lte(value).negated()
    }

    pub fn like(value: &str, wildcard: Wildcard) -> Result<Where, ExpressionError> {
        Ok(Where::like(value, wildcard)?.negated())
    }

    pub fn contains(value: &str) -> Result<Where, ExpressionError> {
        Ok(Where::contains(value)?.negated())
    }

    pub fn is_null() -> Where {
        Where::is_null().negated()
    }

    pub fn inside<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Where {
        Where::inside(values).negated()
    }
}

/// Parenthesized group of conditions joined by the separator given as the
/// field name (`AND` or `OR`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    conditions: Vec<(String, Where)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, condition: Where) -> Self {
        self.conditions.push((field.trim().to_string(), condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl Modifier for Options {
    fn add(&self, separator: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        let separator = separator.trim().to_uppercase();
        if separator != "AND" && separator != "OR" {
            return Err(ExpressionError::InvalidSeparator(separator));
        }
        let conditions: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, condition)| condition.format(field, query))
            .collect();
        query.push(
            ClauseKind::Where,
            format!("({})", conditions.join(&format!(" {} ", separator))),
        );
        Ok(())
    }
}

/// `field BETWEEN start AND end`, swapping reversed bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Between {
    start: Value,
    end: Value,
}

impl Between {
    pub fn new(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        let (start, end) = (start.into(), end.into());
        if start.partial_cmp_value(&end) == Some(std::cmp::Ordering::Greater) {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }
}

impl Modifier for Between {
    fn add(&self, name: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        let condition = format!(
            "{} BETWEEN {} AND {}",
            format_field(name, query),
            self.start,
            self.end
        );
        query.push(ClauseKind::Where, condition);
        Ok(())
    }
}

/// Aggregate condition appended to the latest GROUP BY fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Having {
    function: FunctionKind,
    condition: Where,
}

impl Having {
    pub fn new(function: FunctionKind, condition: Where) -> Self {
        Self { function, condition }
    }

    pub fn avg(condition: Where) -> Self {
        Self::new(FunctionKind::Avg, condition)
    }

    pub fn min(condition: Where) -> Self {
        Self::new(FunctionKind::Min, condition)
    }

    pub fn max(condition: Where) -> Self {
        Self::new(FunctionKind::Max, condition)
    }

    pub fn sum(condition: Where) -> Self {
        Self::new(FunctionKind::Sum, condition)
    }

    pub fn count(condition: Where) -> Self {
        Self::new(FunctionKind::Count, condition)
    }
}

impl Modifier for Having {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let aggregate = Function::new(self.function).format(name, query, session);
        let suffix = format!(" HAVING {} {}", aggregate, self.condition.expr());
        match query.values_mut(ClauseKind::GroupBy).last_mut() {
            Some(last) => {
                last.push_str(&suffix);
                Ok(())
            }
            None => Err(ExpressionError::MissingGroupBy(name.trim().to_string())),
        }
    }
}
