use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryModelError {
    #[error("No relationship found between {left} and {right}.")]
    NoRelationshipFound { left: String, right: String },

    #[error("Primary key not found for {0} (mark one with PrimaryKey or register a foreign key)")]
    MissingPrimaryKey(String),

    #[error("Query has no table (set one with Table or Query::new)")]
    MissingTable,
}
