use sqlblocks::parser::{merge_all, parse};
use sqlblocks::{translate, ClauseKind, Dialect, Language, Query, Session, SessionConfig};

fn single_line() -> Session {
    Session::new(SessionConfig {
        break_lines: false,
        ..Default::default()
    })
}

fn parsed(text: &str, session: &Session) -> Query {
    merge_all(parse(text, session).unwrap(), session).unwrap()
}

const PRODUCTS: &str = "SELECT p.name, p.price FROM Product p \
                        WHERE p.price > 10 AND p.category = 'Gizmo' \
                        ORDER BY p.price DESC LIMIT 5 OFFSET 10";

#[test]
fn test_sql_mongo_sql() {
    let session = single_line();
    let mongo = translate(PRODUCTS, Language::MongoDb, &session).unwrap();
    assert_eq!(
        mongo,
        r#"db.Product.find({"price":{"$gt":10},"category":"Gizmo"}, {"name":1,"price":1}).sort({"price":-1}).limit(5).skip(10)"#
    );
    assert_eq!(parsed(&mongo, &session), parsed(PRODUCTS, &session));
}

#[test]
fn test_sql_cypher_sql() {
    let session = single_line();
    let text = "SELECT p.name FROM Product p JOIN Vendor v ON (p.vendor_id = v.id) \
                WHERE p.price > 10 AND v.country = 'BR'";
    let cypher = translate(text, Language::Neo4j, &session).unwrap();
    assert_eq!(
        cypher,
        "MATCH (p:Product)-->(v:Vendor{country:'BR'}) WHERE p.price > 10 RETURN p.name"
    );
    let back = translate(&cypher, Language::Sql, &session).unwrap();
    assert_eq!(parsed(&back, &session), parsed(text, &session));
}

#[test]
fn test_shorthand_to_every_language() {
    let session = single_line();
    let text = "Product p(name, price?price > 10)";
    for language in Language::ALL {
        let output = translate(text, language, &session).unwrap();
        assert!(!output.is_empty(), "{language} rendered nothing");
    }
    assert_eq!(
        translate(text, Language::Pipe, &session).unwrap(),
        "FROM Product p |> WHERE p.price > 10 |> SELECT p.name, p.price"
    );
    let pandas = translate(text, Language::Pandas, &session).unwrap();
    assert!(pandas.starts_with("import pandas as pd\n"));
    assert!(pandas.contains("read_csv('Product.csv')"));
    let spark = translate(text, Language::Spark, &session).unwrap();
    assert!(spark.contains("spark.table('Product').alias('p')"));
}

#[test]
fn test_dialect_limits() {
    for (dialect, expected) in [
        (Dialect::Ansi, "SELECT p.name FROM Product p LIMIT 3"),
        (Dialect::SqlServer, "SELECT TOP(3) p.name FROM Product p"),
        (Dialect::Oracle, "SELECT p.name FROM Product p WHERE ROWNUM <= 3"),
    ] {
        let session = Session::new(SessionConfig {
            break_lines: false,
            dialect,
            ..Default::default()
        });
        let mut query = parsed("SELECT p.name FROM Product p", &session);
        query.limit(3, 0, &session);
        assert_eq!(query.to_sql(&session), expected);
    }
}

#[test]
fn test_sql_round_trip_keeps_text() {
    let session = Session::default();
    let original = parsed(PRODUCTS, &session);
    let text = original.to_sql(&session);
    let again = parsed(&text, &session);
    assert_eq!(again, original);
    assert_eq!(again.to_sql(&session), text);
    assert_eq!(again.values(ClauseKind::Limit), ["5 OFFSET 10"]);
}
