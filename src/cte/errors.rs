use thiserror::Error;

use crate::expression::ExpressionError;
use crate::parser::ParserError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CteError {
    #[error("Invalid table pattern '{0}' (expected Table(field, ...))")]
    InvalidPattern(String),

    #[error("Table pattern '{0}' has no key field (mark one with *)")]
    MissingKey(String),

    #[error("Position [{position}] is out of range for {count} fields")]
    UnknownPosition { position: usize, count: usize },

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
