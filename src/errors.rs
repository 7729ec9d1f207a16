use thiserror::Error;

use crate::cte::CteError;
use crate::expression::ExpressionError;
use crate::generator::GeneratorError;
use crate::parser::ParserError;
use crate::query_model::QueryModelError;
use crate::rules::RuleError;

/// Any failure of the crate's façade functions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlBlocksError {
    #[error(transparent)]
    QueryModel(#[from] QueryModelError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Cte(#[from] CteError),
}
