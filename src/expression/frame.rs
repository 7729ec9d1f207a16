//! Window frames: the `OVER(...)` suffix of window and aggregate functions.

use std::fmt;

use crate::query_model::Query;

use super::field::format_field;
use super::ExpressionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowBound {
    /// `None` is UNBOUNDED
    Preceding(Option<u32>),
    Following(Option<u32>),
    CurrentRow,
    Between(Box<RowBound>, Box<RowBound>),
}

impl RowBound {
    pub fn between(start: RowBound, end: RowBound) -> Self {
        RowBound::Between(Box::new(start), Box::new(end))
    }

    /// `3 preceding`, `unbounded following`, `current row`,
    /// `between 1 preceding and current row`.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let words: Vec<String> = text.split_whitespace().map(str::to_uppercase).collect();
        let invalid = || ExpressionError::InvalidFrameArgument(text.trim().to_string());

        if words.first().map(String::as_str) == Some("BETWEEN") {
            let and = words.iter().position(|w| w == "AND").ok_or_else(invalid)?;
            let start = Self::parse_single(&words[1..and]).ok_or_else(invalid)?;
            let end = Self::parse_single(&words[and + 1..]).ok_or_else(invalid)?;
            return Ok(Self::between(start, end));
        }
        Self::parse_single(&words).ok_or_else(invalid)
    }

    fn parse_single(words: &[String]) -> Option<Self> {
        match words {
            [current, row] if current == "CURRENT" && row == "ROW" => Some(RowBound::CurrentRow),
            [count, direction] => {
                let count = if count == "UNBOUNDED" {
                    None
                } else {
                    Some(count.parse().ok()?)
                };
                match direction.as_str() {
                    "PRECEDING" => Some(RowBound::Preceding(count)),
                    "FOLLOWING" => Some(RowBound::Following(count)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ExpressionError> {
        if let RowBound::Between(start, end) = self {
            if matches!(**start, RowBound::Between(..)) || matches!(**end, RowBound::Between(..)) {
                return Err(ExpressionError::InvalidFrameArgument(
                    "nested BETWEEN in row bound".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |n: &Option<u32>| match n {
            Some(n) => n.to_string(),
            None => "UNBOUNDED".to_string(),
        };
        match self {
            RowBound::Preceding(n) => write!(f, "{} PRECEDING", count(n)),
            RowBound::Following(n) => write!(f, "{} FOLLOWING", count(n)),
            RowBound::CurrentRow => f.write_str("CURRENT ROW"),
            RowBound::Between(start, end) => write!(f, "BETWEEN {} AND {}", start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameArg {
    OrderBy(String),
    Partition(String),
    Rows(RowBound),
}

impl FrameArg {
    /// Keyword form: `order=due_date`, `partition=student_id`,
    /// `rows=between 1 preceding and current row`.
    pub fn from_named(key: &str, value: &str) -> Result<Self, ExpressionError> {
        match key.trim().to_lowercase().as_str() {
            "order" | "order_by" => Ok(FrameArg::OrderBy(value.trim().to_string())),
            "partition" | "partition_by" => Ok(FrameArg::Partition(value.trim().to_string())),
            "rows" => Ok(FrameArg::Rows(RowBound::parse(value)?)),
            other => Err(ExpressionError::InvalidFrameArgument(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowFrame {
    partition: Vec<String>,
    order: Vec<String>,
    rows: Option<RowBound>,
}

impl WindowFrame {
    pub fn new(args: Vec<FrameArg>) -> Result<Self, ExpressionError> {
        let mut frame = Self::default();
        for arg in args {
            match arg {
                FrameArg::OrderBy(field) | FrameArg::Partition(field) if field.is_empty() => {
                    return Err(ExpressionError::InvalidFrameArgument(
                        "empty field name".to_string(),
                    ));
                }
                FrameArg::OrderBy(field) => frame.order.push(field),
                FrameArg::Partition(field) => frame.partition.push(field),
                FrameArg::Rows(bound) => {
                    if frame.rows.is_some() {
                        return Err(ExpressionError::InvalidFrameArgument(
                            "more than one ROWS specification".to_string(),
                        ));
                    }
                    bound.validate()?;
                    frame.rows = Some(bound);
                }
            }
        }
        Ok(frame)
    }

    pub fn render(&self, query: &Query) -> String {
        let fields = |names: &[String]| {
            names
                .iter()
                .map(|name| format_field(name, query))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut parts = Vec::new();
        if !self.partition.is_empty() {
            parts.push(format!("PARTITION BY {}", fields(&self.partition)));
        }
        if !self.order.is_empty() {
            parts.push(format!("ORDER BY {}", fields(&self.order)));
        }
        if let Some(rows) = &self.rows {
            parts.push(format!("ROWS {}", rows));
        }
        format!("OVER({})", parts.join(" "))
    }
}
