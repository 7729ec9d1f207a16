use thiserror::Error;

use crate::query_model::QueryModelError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Possible SQL injection in literal: {0}")]
    PossibleInjection(String),

    #[error("Invalid logical separator '{0}' (expected AND or OR)")]
    InvalidSeparator(String),

    #[error("Invalid window frame argument: {0}")]
    InvalidFrameArgument(String),

    #[error("HAVING on '{0}' needs a GROUP BY field first")]
    MissingGroupBy(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error(transparent)]
    QueryModel(#[from] QueryModelError),
}
