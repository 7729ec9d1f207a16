use sqlblocks::expression::Where;
use sqlblocks::parser::{merge_all, parse};
use sqlblocks::rules::{AutoField, LogicalOp, PutLimit, Rule, SelectIn};
use sqlblocks::{ClauseKind, Query, Session, SessionConfig};

fn parsed(text: &str, session: &Session) -> Query {
    merge_all(parse(text, session).unwrap(), session).unwrap()
}

#[test]
fn test_or_group_equals_in_predicate() {
    let session = Session::default();
    let mut query = parsed(
        "SELECT * FROM Product p WHERE (p.category='Gizmo' OR p.category='Gadget' OR p.category='Doohickey')",
        &session,
    );
    let rules: Vec<Box<dyn Rule>> = vec![Box::new(SelectIn)];
    query.optimize(Some(rules.as_slice()), &session).unwrap();

    let expected = Query::new("Product p", &session)
        .with("category", Where::inside(["Gizmo", "Gadget", "Doohickey"]), &session)
        .unwrap();
    assert_eq!(query, expected);
}

#[test]
fn test_idempotent_rules() {
    let session = Session::default();
    let text = "SELECT p.name FROM Product p \
                WHERE NOT p.price > 10 AND (p.code = 1 OR p.code = 2) ORDER BY p.category";
    let rule_sets: Vec<Vec<Box<dyn Rule>>> = vec![
        vec![Box::new(PutLimit)],
        vec![Box::new(SelectIn)],
        vec![Box::new(AutoField)],
        vec![Box::new(LogicalOp)],
    ];
    for rules in &rule_sets {
        let mut once = parsed(text, &session);
        once.optimize(Some(rules.as_slice()), &session).unwrap();
        let mut twice = once.clone();
        twice.optimize(Some(rules.as_slice()), &session).unwrap();
        assert_eq!(once, twice, "{} is not idempotent", rules[0].name());
        for kind in ClauseKind::ALL {
            assert_eq!(once.values(kind), twice.values(kind));
        }
    }
}

#[test]
fn test_default_rules() {
    let session = Session::new(SessionConfig {
        break_lines: false,
        ..Default::default()
    });
    let mut query = parsed(
        "SELECT p.name FROM Product p JOIN Vendor v ON (p.vendor_id = v.id) \
         WHERE NOT p.price > 10 AND v.country = 'BR' AND YEAR(p.last_sale) = 2024 \
         ORDER BY p.category",
        &session,
    );
    query.optimize(None, &session).unwrap();

    assert_eq!(query.values(ClauseKind::From), ["Product p"]);
    assert_eq!(query.values(ClauseKind::Select), ["p.name", "p.category"]);
    let conditions = query.values(ClauseKind::Where);
    assert!(conditions.contains(&"p.price <= 10".to_string()));
    assert!(conditions.contains(&"p.last_sale BETWEEN '2024-01-01' AND '2024-12-31'".to_string()));
    assert!(conditions.contains(
        &"p.vendor_id IN (SELECT v.id FROM Vendor v WHERE v.country = 'BR')".to_string()
    ));
    // a filtered query is left unbounded
    assert!(query.is_empty(ClauseKind::Limit));
}

#[test]
fn test_put_limit_on_bare_query() {
    let session = Session::new(SessionConfig {
        default_limit: 25,
        ..Default::default()
    });
    let mut query = Query::new("Product p", &session);
    query.optimize(None, &session).unwrap();
    assert_eq!(query.values(ClauseKind::Limit), ["25"]);
}
