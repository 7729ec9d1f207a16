//! Text to `Query` lists.
//!
//! Every syntax goes through the shared [`lexer`] and then a small state
//! machine of its own. [`detect_parser`] picks the syntax from the shape of
//! the input.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::query_model::{Query, QueryModelError, Session};

pub mod cypher;
mod errors;
pub mod lexer;
pub mod mongo;
pub mod shorthand;
pub mod sql;

pub use cypher::CypherParser;
pub use errors::ParserError;
pub use lexer::{Token, TokenKind};
pub use mongo::MongoParser;
pub use shorthand::ShorthandParser;
pub use sql::SqlParser;

/// A parser turns a token stream into one or more queries.
///
/// Queries returned together are linked through foreign keys registered on
/// the session while parsing, so they can be merged afterwards.
pub trait QueryParser {
    fn tokenize<'t>(&self, text: &'t str) -> Result<Vec<Token<'t>>, ParserError> {
        let tokens = lexer::tokenize(text)?;
        lexer::check_balance(&tokens)?;
        Ok(tokens)
    }

    fn evaluate(&self, text: &str, tokens: &[Token<'_>]) -> Result<Vec<Query>, ParserError>;

    fn parse(&self, text: &str) -> Result<Vec<Query>, ParserError> {
        let tokens = self.tokenize(text)?;
        self.evaluate(text, &tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Sql,
    Shorthand,
    Cypher,
    Mongo,
}

impl SyntaxKind {
    pub fn parse(self, text: &str, session: &Session) -> Result<Vec<Query>, ParserError> {
        match self {
            SyntaxKind::Sql => SqlParser::new(session).parse(text),
            SyntaxKind::Shorthand => ShorthandParser::new(session).parse(text),
            SyntaxKind::Cypher => CypherParser::new(session).parse(text),
            SyntaxKind::Mongo => MongoParser::new(session).parse(text),
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyntaxKind::Sql => "sql",
            SyntaxKind::Shorthand => "shorthand",
            SyntaxKind::Cypher => "cypher",
            SyntaxKind::Mongo => "mongo",
        };
        f.write_str(name)
    }
}

static MONGO_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^db\.\w+\.\w+\s*\(").unwrap());
static CYPHER_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^MATCH\s*\(").unwrap());
static SQL_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").unwrap());
static SHORTHAND_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(\s+\w+)?\s*\(").unwrap());
static BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Choose the syntax of `text` from its leading signature.
pub fn detect_parser(text: &str) -> Result<SyntaxKind, ParserError> {
    let normalized = BLANKS.replace_all(text.trim(), " ");
    let signatures: [(&LazyLock<Regex>, SyntaxKind); 4] = [
        (&MONGO_SIGNATURE, SyntaxKind::Mongo),
        (&CYPHER_SIGNATURE, SyntaxKind::Cypher),
        (&SQL_SIGNATURE, SyntaxKind::Sql),
        (&SHORTHAND_SIGNATURE, SyntaxKind::Shorthand),
    ];
    for (regex, kind) in signatures {
        if regex.is_match(&normalized) {
            log::debug!("detected {} syntax", kind);
            return Ok(kind);
        }
    }
    let head: String = normalized.chars().take(40).collect();
    Err(ParserError::UnknownSyntax(head))
}

/// Fold parsed queries into one along the session's foreign keys.
pub fn merge_all(queries: Vec<Query>, session: &Session) -> Result<Query, ParserError> {
    let mut queries = queries.into_iter();
    let first = queries
        .next()
        .ok_or(ParserError::QueryModel(QueryModelError::MissingTable))?;
    let merged = queries.try_fold(first, |merged, query| merged.merge(&query, session))?;
    Ok(merged)
}

/// Sniff the syntax of `text` and parse it.
pub fn parse(text: &str, session: &Session) -> Result<Vec<Query>, ParserError> {
    detect_parser(text)?.parse(text, session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("SELECT * FROM Product p", SyntaxKind::Sql; "sql")]
    #[test_case("  select name\n from Product", SyntaxKind::Sql; "sql lower case")]
    #[test_case("MATCH (p:Product) RETURN p", SyntaxKind::Cypher; "cypher")]
    #[test_case("db.Product.find({})", SyntaxKind::Mongo; "mongo")]
    #[test_case("Product(name, price?price > 10)", SyntaxKind::Shorthand; "shorthand")]
    #[test_case("Product p(name) -> Vendor v(id)", SyntaxKind::Shorthand; "shorthand with alias")]
    fn test_detect(text: &str, expected: SyntaxKind) {
        assert_eq!(detect_parser(text).unwrap(), expected);
    }

    #[test]
    fn test_detect_unknown() {
        assert!(matches!(
            detect_parser("DELETE FROM Product"),
            Err(ParserError::UnknownSyntax(_))
        ));
    }
}
