use thiserror::Error;

use crate::expression::ExpressionError;
use crate::generator::GeneratorError;
use crate::parser::ParserError;
use crate::query_model::QueryModelError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    QueryModel(#[from] QueryModelError),
}
