use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeneratorError {
    #[error("{language} has no equivalent for condition: {condition}")]
    UnsupportedCondition { language: String, condition: String },

    #[error("{language} cannot render field: {field}")]
    UnsupportedField { language: String, field: String },

    #[error("Unknown target language '{0}' (expected sql, mongodb, neo4j, pipe, pandas or spark)")]
    UnknownLanguage(String),
}
