//! Malformed input must come back as an error, never a panic.

use sqlblocks::parser::{detect_parser, ParserError, SyntaxKind};
use sqlblocks::{detect, Session, SqlBlocksError};

#[test]
fn test_malformed_queries_no_panic() {
    let session = Session::default();
    let malformed = [
        "",
        "SELECT",
        "SELECT * FROM",
        "SELECT * FROM Product p WHERE (p.price > 1",
        "SELECT * FROM Product p WHERE p.price > 1)",
        "MATCH",
        "MATCH (",
        "MATCH (p:Product",
        "MATCH (p:Product)-[",
        "MATCH () RETURN x",
        "db.Product.find(",
        "db.Product.find({price: })",
        "db.Product.aggregate([{$facet: {}}])",
        "Product(",
        "Product(name) -> ",
        "Product(name, $nope:x y)",
    ];
    for text in malformed {
        let _ = detect(text, &session);
    }
}

#[test]
fn test_unbalanced_parentheses_are_reported() {
    let session = Session::default();
    for text in [
        "SELECT * FROM Product p WHERE (p.price > 1",
        "db.Product.find({price: 1}",
        "Product(name",
    ] {
        assert!(
            matches!(detect(text, &session), Err(SqlBlocksError::Parser(_))),
            "{text} parsed"
        );
    }
}

#[test]
fn test_detect_ignores_leading_whitespace() {
    assert_eq!(detect_parser("\n\t  select * from Product").unwrap(), SyntaxKind::Sql);
    assert_eq!(detect_parser("\n match (p:Product) return p").unwrap(), SyntaxKind::Cypher);
    assert!(matches!(
        detect_parser("INSERT INTO Product VALUES (1)"),
        Err(ParserError::UnknownSyntax(_))
    ));
}
