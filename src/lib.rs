//! sqlblocks - composable query building blocks
//!
//! Queries are kept as clause-indexed text fragments and can be:
//! - built from modifiers (fields, functions, predicates, sub-selects)
//! - parsed from SQL, a compact graph shorthand, Cypher or MongoDB calls
//! - merged along foreign keys registered on a [`Session`]
//! - rewritten by optimization rules
//! - rendered as SQL (several dialects), MongoDB, Cypher, a pipe dialect,
//!   pandas or PySpark

pub mod config;
pub mod cte;
pub mod errors;
pub mod expression;
pub mod generator;
pub mod parser;
pub mod query_model;
pub mod rules;

pub use config::{Dialect, SessionConfig};
pub use errors::SqlBlocksError;
pub use generator::Language;
pub use query_model::{ClauseKind, Query, Session};

/// Sniff the syntax of `text` and parse it into queries linked through the
/// session's foreign keys.
pub fn detect(text: &str, session: &Session) -> Result<Vec<Query>, SqlBlocksError> {
    Ok(parser::parse(text, session)?)
}

/// Parse `text` in whatever syntax it is written, merge the resulting
/// queries and render them in `language`.
pub fn translate(text: &str, language: Language, session: &Session) -> Result<String, SqlBlocksError> {
    let query = parser::merge_all(detect(text, session)?, session)?;
    Ok(query.translate_to(language, session)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_line() -> Session {
        Session::new(SessionConfig {
            break_lines: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_translate_shorthand_to_sql() {
        let session = single_line();
        let text = translate(
            "Product p(name, vendor_id) -> Vendor v(id?country = 'BR')",
            Language::Sql,
            &session,
        )
        .unwrap();
        assert_eq!(
            text,
            "SELECT p.name FROM Product p JOIN Vendor v ON (p.vendor_id = v.id) WHERE v.country = 'BR'"
        );
    }

    #[test]
    fn test_translate_sql_to_cypher() {
        let session = single_line();
        let text = translate(
            "SELECT p.name FROM Product p WHERE p.category = 'Gizmo' AND p.price > 10",
            Language::Neo4j,
            &session,
        )
        .unwrap();
        assert_eq!(
            text,
            "MATCH (p:Product{category:'Gizmo'}) WHERE p.price > 10 RETURN p.name"
        );
    }

    #[test]
    fn test_detect_unknown_syntax() {
        let session = Session::default();
        assert!(matches!(
            detect("UPDATE Product SET price = 1", &session),
            Err(SqlBlocksError::Parser(parser::ParserError::UnknownSyntax(_)))
        ));
    }
}
