use sqlblocks::expression::{ExpressionError, Field, Function, NamedField, Range, Where, Wildcard};
use sqlblocks::{ClauseKind, Query, Session, SessionConfig};

fn single_line() -> Session {
    Session::new(SessionConfig {
        break_lines: false,
        ..Default::default()
    })
}

#[test]
fn test_injection_heuristic() {
    assert!(matches!(
        Where::eq("AAA'OR 1=1"),
        Err(ExpressionError::PossibleInjection(_))
    ));
    assert!(matches!(
        Where::like("x' Or 1=1 --", Wildcard::End),
        Err(ExpressionError::PossibleInjection(_))
    ));
    for word in ["world", "short", "order"] {
        assert!(Where::eq(word).is_ok(), "{word} was rejected");
    }
}

#[test]
fn test_range_buckets() {
    let session = single_line();
    let range = Range::new(
        "age",
        &[
            ("child", 10),
            ("teenager", 17),
            ("young", 21),
            ("adult", 50),
            ("elderly", 70),
        ],
    );
    let query = Query::new("Person p", &session)
        .with("age_group", range, &session)
        .unwrap();
    let text = &query.values(ClauseKind::Select)[0];
    let first = text.find("BETWEEN 0 AND 10 THEN 'child'").unwrap();
    let last = text.find("BETWEEN 51 AND 70 THEN 'elderly'").unwrap();
    assert!(first < last);
    assert!(text.contains("BETWEEN 11 AND 17 THEN 'teenager'"));
}

#[test]
fn test_modifiers_build_clauses() {
    let session = single_line();
    let query = Query::new("Product p", &session)
        .with("name", Field, &session)
        .unwrap()
        .with("price", NamedField::new("cost"), &session)
        .unwrap()
        .with("price", Where::gt(10), &session)
        .unwrap()
        .with("name", Where::contains("gizmo").unwrap(), &session)
        .unwrap();
    assert_eq!(
        query.to_sql(&session),
        "SELECT p.name, p.price as cost FROM Product p WHERE p.price > 10 AND p.name LIKE '%gizmo%'"
    );
}

#[test]
fn test_unknown_function_name() {
    assert!(matches!(
        Function::from_name("median"),
        Err(ExpressionError::UnknownFunction(_))
    ));
}
