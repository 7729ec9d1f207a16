use sqlblocks::cte::{Cte, CteFactory, Recursive};
use sqlblocks::parser::{merge_all, parse};
use sqlblocks::{ClauseKind, Query, Session, SessionConfig};

fn single_line() -> Session {
    Session::new(SessionConfig {
        break_lines: false,
        ..Default::default()
    })
}

#[test]
fn test_cte_over_parsed_queries() {
    let session = single_line();
    let queries = ["employee", "customer"]
        .iter()
        .map(|role| {
            let text = format!("SELECT u.name, u.id FROM Users u WHERE u.role = '{}'", role);
            merge_all(parse(&text, &session).unwrap(), &session).unwrap()
        })
        .collect();
    let mut cte = Cte::new("people p", queries, &session);
    let mut main = Query::new("people p", &session);
    main.push(ClauseKind::Select, "p.name");
    cte.set_main(main);

    let text = cte.render(&session);
    assert!(text.starts_with("WITH people AS (SELECT u.name, u.id FROM Users u"));
    assert!(text.contains(" UNION ALL "));
    assert!(text.ends_with(") SELECT p.name FROM people p"));
    assert_eq!(cte.field_names(), ["name", "id"]);
}

#[test]
fn test_recursive_flights() {
    let session = single_line();
    let mut routes = Recursive::create(
        "Route R",
        "Flight(departure, arrival)",
        "[1] = R.[2]",
        "LAX",
        "",
        &session,
    )
    .unwrap();
    routes.counter("stops", 0, "+ 1");
    let text = routes.render(&session);
    assert!(text.starts_with("WITH RECURSIVE Route AS (SELECT f1.departure, f1.arrival, 0 as stops"));
    assert!(text.contains("WHERE f1.departure = 'LAX' UNION ALL"));
    assert!(text.contains("(R.stops + 1) as stops FROM Flight f2, Route R WHERE f2.departure = R.arrival"));
}

#[test]
fn test_factory_render_and_expand() {
    let session = single_line();
    let factory = CteFactory::new(
        "SELECT a.name, b.total FROM (SELECT c.id, c.name FROM Customer c) AS a \
         JOIN (SELECT o.customer_id, SUM(o.value) as total FROM Orders o GROUP BY o.customer_id) b \
         ON a.id = b.customer_id",
        &session,
    )
    .unwrap();
    assert_eq!(factory.ctes().len(), 2);

    let text = factory.render(&session);
    assert!(text.starts_with("WITH a AS (SELECT c.id, c.name FROM Customer c), b AS ("));
    assert!(text.contains(") SELECT a.name, b.total FROM a a JOIN b b ON (a.id = b.customer_id)"));

    assert_eq!(
        factory.expand("SELECT COUNT(*) FROM #table").unwrap(),
        ["SELECT COUNT(*) FROM a", "SELECT COUNT(*) FROM b"]
    );
}
