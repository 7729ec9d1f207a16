use sqlblocks::expression::{Field, Where};
use sqlblocks::query_model::QueryModelError;
use sqlblocks::{ClauseKind, Query, Session};

fn school() -> Session {
    let session = Session::default();
    session.register_foreign_key("Student", "Class", "class_id", Some("id"));
    session.register_foreign_key("Teacher", "Class", "class_id", Some("id"));
    session
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values
}

#[test]
fn test_student_class_teacher() {
    let session = school();
    let student = Query::new("Student s", &session)
        .with("name", Field, &session)
        .unwrap()
        .with("age", Where::gt(18), &session)
        .unwrap();
    let class = Query::new("Class c", &session)
        .with("room", Field, &session)
        .unwrap();
    let teacher = Query::new("Teacher t", &session)
        .with("name", Field, &session)
        .unwrap()
        .with("subject", Where::eq("Math").unwrap(), &session)
        .unwrap();

    let merged = student
        .merge(&class, &session)
        .unwrap()
        .merge(&teacher, &session)
        .unwrap();

    let joins: Vec<&String> = merged
        .values(ClauseKind::From)
        .iter()
        .filter(|fragment| fragment.starts_with("JOIN"))
        .collect();
    assert_eq!(joins.len(), 2);
    assert!(joins.iter().any(|j| j.contains("Class c")));
    assert!(joins.iter().any(|j| j.contains("Teacher t")));
    assert_eq!(
        sorted(merged.values(ClauseKind::Select)),
        ["c.room", "s.name", "t.name"]
    );
    assert_eq!(
        sorted(merged.values(ClauseKind::Where)),
        ["s.age > 18", "t.subject = 'Math'"]
    );

    // grouping does not matter
    let other = student
        .merge(&class.merge(&teacher, &session).unwrap(), &session)
        .unwrap();
    assert_eq!(merged, other);
}

#[test]
fn test_merge_inputs_untouched() {
    let session = school();
    let student = Query::new("Student s", &session)
        .with("name", Field, &session)
        .unwrap();
    let class = Query::new("Class c", &session);
    let before = student.clone();
    let _ = student.merge(&class, &session).unwrap();
    assert_eq!(student, before);
    assert_eq!(student.values(ClauseKind::From), ["Student s"]);
}

#[test]
fn test_unrelated_tables() {
    let session = school();
    let student = Query::new("Student s", &session);
    let room = Query::new("Building b", &session);
    assert!(matches!(
        student.merge(&room, &session),
        Err(QueryModelError::NoRelationshipFound { .. })
    ));
}
