use thiserror::Error;

use crate::expression::ExpressionError;
use crate::query_model::QueryModelError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParserError {
    #[error("Unknown syntax: {0}")]
    UnknownSyntax(String),

    #[error("Alias '{0}' is not declared")]
    UnknownAlias(String),

    #[error("Cannot infer the key fields of table {0}")]
    MissingKeyContext(String),

    #[error("Unbalanced '{0}'")]
    UnbalancedBrackets(char),

    #[error("Unexpected token '{token}' at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error(transparent)]
    QueryModel(#[from] QueryModelError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
