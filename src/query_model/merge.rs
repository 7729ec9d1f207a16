//! Combining two queries: merge along a registered foreign key, and the
//! NOT-IN anti-join.

use super::clause::{ClauseKind, JoinType};
use super::errors::QueryModelError;
use super::normalize::{rename_alias, JoinFragment};
use super::query::{Query, QueryRole};
use super::session::{Relationship, Session};

/// `(foreign_field, primary_field)` when `child` references `parent`.
fn find_foreign_key(child: &Query, parent: &Query, session: &Session) -> Option<Relationship> {
    session.find_foreign_key(child.table_name(), parent.table_name())
}

/// One table of a query: the main table or a joined one.
#[derive(Debug, Clone)]
struct Source {
    table: String,
    alias: String,
    is_main: bool,
}

fn sources(query: &Query) -> Vec<Source> {
    let mut result = vec![Source {
        table: query.table_name().to_string(),
        alias: query.alias().to_string(),
        is_main: true,
    }];
    result.extend(
        query
            .values(ClauseKind::From)
            .iter()
            .skip(1)
            .filter_map(|fragment| JoinFragment::parse(fragment))
            .map(|join| Source {
                table: join.table,
                alias: join.alias,
                is_main: false,
            }),
    );
    result
}

/// How the sources of `other` attach to `query`.
enum Link {
    /// Both sides already hold this table
    Shared { own_alias: String, other_alias: String },
    /// A new JOIN brings in one source of `other`
    Join(JoinFragment),
}

fn find_link(query: &Query, other: &Query, session: &Session) -> Result<Option<Link>, QueryModelError> {
    let own = sources(query);
    let theirs = sources(other);
    for mine in &own {
        if let Some(shared) = theirs.iter().find(|s| s.table.eq_ignore_ascii_case(&mine.table)) {
            return Ok(Some(Link::Shared {
                own_alias: mine.alias.clone(),
                other_alias: shared.alias.clone(),
            }));
        }
    }
    for mine in &own {
        for their in &theirs {
            if mine.is_main && their.is_main {
                continue;
            }
            let condition = if let Some(fk) = session.find_foreign_key(&mine.table, &their.table) {
                let key = fk
                    .primary_field
                    .or_else(|| their.is_main.then(|| other.key_field().map(str::to_string)).flatten())
                    .ok_or_else(|| QueryModelError::MissingPrimaryKey(their.table.clone()))?;
                format!("{}.{} = {}.{}", mine.alias, fk.foreign_field, their.alias, key)
            } else if let Some(fk) = session.find_foreign_key(&their.table, &mine.table) {
                let key = fk
                    .primary_field
                    .or_else(|| mine.is_main.then(|| query.key_field().map(str::to_string)).flatten())
                    .ok_or_else(|| QueryModelError::MissingPrimaryKey(mine.table.clone()))?;
                format!("{}.{} = {}.{}", their.alias, fk.foreign_field, mine.alias, key)
            } else {
                continue;
            };
            return Ok(Some(Link::Join(JoinFragment {
                join_type: other.join_type(),
                table: their.table.clone(),
                alias: their.alias.clone(),
                condition,
            })));
        }
    }
    Ok(None)
}

/// Merge when the relationship runs through a joined table of either side.
///
/// The JOIN tree of `other` is re-rooted at the linked source, so each
/// emitted fragment only references aliases introduced before it.
fn join_through_sources(
    query: &Query,
    other: &Query,
    session: &Session,
) -> Result<Option<Query>, QueryModelError> {
    let Some(link) = find_link(query, other, session)? else {
        return Ok(None);
    };
    let (start, rename) = match &link {
        Link::Shared {
            own_alias,
            other_alias,
        } => (other_alias.clone(), Some((other_alias.clone(), own_alias.clone()))),
        Link::Join(join) => (join.alias.clone(), None),
    };
    let rename = |text: &str| match &rename {
        Some((from, to)) => rename_alias(text, from, to),
        None => text.to_string(),
    };
    log::debug!(
        "merge: {} reaches {} through alias {}",
        query.table_name(),
        other.table_name(),
        start
    );

    let theirs = sources(other);
    let mut edges: Vec<(String, String, JoinFragment)> = Vec::new();
    let mut extra: Vec<String> = Vec::new();
    for fragment in other.values(ClauseKind::From).iter().skip(1) {
        let parsed = JoinFragment::parse(fragment)
            .and_then(|join| join.key_pair().map(|((a, _), (b, _))| (a, b, join)));
        match parsed {
            Some((a, b, join)) => {
                let far = if a == join.alias { b } else { a };
                edges.push((join.alias.clone(), far, join));
            }
            None => extra.push(fragment.clone()),
        }
    }

    let mut emitted: Vec<String> = Vec::new();
    if let Link::Join(join) = &link {
        emitted.push(join.to_fragment());
    }
    let mut introduced = vec![start];
    while let Some(pos) = edges.iter().position(|(a, b, _)| {
        introduced.contains(a) != introduced.contains(b)
    }) {
        let (a, b, join) = edges.remove(pos);
        let alias = if introduced.contains(&a) { b } else { a };
        let Some(source) = theirs.iter().find(|s| s.alias == alias) else {
            continue;
        };
        emitted.push(
            JoinFragment {
                join_type: join.join_type,
                table: source.table.clone(),
                alias: rename(&alias),
                condition: rename(&join.condition),
            }
            .to_fragment(),
        );
        introduced.push(alias);
    }
    // fragments that never connect stay as they were
    extra.extend(edges.into_iter().map(|(_, _, join)| join.to_fragment()));

    let mut merged = query.clone();
    for source in emitted.into_iter().chain(extra) {
        let from = merged.values_mut(ClauseKind::From);
        if !from.iter().skip(1).any(|existing| existing == &source) {
            from.push(source);
        }
    }
    for kind in ClauseKind::USUAL {
        let values: Vec<String> = other.values(kind).iter().map(|v| rename(v)).collect();
        merged.update_values(kind, &values);
    }
    Ok(Some(merged))
}

impl Query {
    /// Join this query into `main`, where `main.foreign_field` references
    /// this query's key field.
    ///
    /// The JOIN fragment goes after the existing joins of `main`, followed by
    /// any extra sources of this query; the other clauses are unioned.
    pub fn join_into(&self, main: &mut Query, foreign_field: &str) -> Result<(), QueryModelError> {
        let key = self
            .key_field()
            .ok_or_else(|| QueryModelError::MissingPrimaryKey(self.table_name().to_string()))?;
        let join = JoinFragment {
            join_type: self.join_type(),
            table: self.table_name().to_string(),
            alias: self.alias().to_string(),
            condition: format!("{}.{} = {}.{}", main.alias(), foreign_field, self.alias(), key),
        }
        .to_fragment();

        let mut sources = vec![join];
        sources.extend(self.values(ClauseKind::From).iter().skip(1).cloned());
        for source in sources {
            let from = main.values_mut(ClauseKind::From);
            if !from.iter().skip(1).any(|existing| existing == &source) {
                from.push(source);
            }
        }
        for kind in ClauseKind::USUAL {
            main.update_values(kind, self.values(kind));
        }
        Ok(())
    }

    /// Combine two queries into one.
    ///
    /// Same table: clause lists are unioned. Different tables: the side
    /// holding the foreign field gains the JOIN and receives the other's
    /// clauses. Neither input is modified.
    pub fn merge(&self, other: &Query, session: &Session) -> Result<Query, QueryModelError> {
        let mut query = self.clone();
        let mut other = other.clone();

        if query.table_name().eq_ignore_ascii_case(other.table_name()) {
            for kind in ClauseKind::USUAL {
                let renamed: Vec<String> = other
                    .values(kind)
                    .iter()
                    .map(|fragment| rename_alias(fragment, other.alias(), query.alias()))
                    .collect();
                query.update_values(kind, &renamed);
            }
            return Ok(query);
        }

        if let Some(fk) = find_foreign_key(&query, &other, session) {
            log::debug!(
                "merge: {} joins {} on {}",
                query.table_name(),
                other.table_name(),
                fk.foreign_field
            );
            if let Some(primary) = &fk.primary_field {
                other.set_key_field(primary);
            }
            other.join_into(&mut query, &fk.foreign_field)?;
            return Ok(query);
        }
        if let Some(fk) = find_foreign_key(&other, &query, session) {
            log::debug!(
                "merge: {} joins {} on {}",
                other.table_name(),
                query.table_name(),
                fk.foreign_field
            );
            if let Some(primary) = &fk.primary_field {
                query.set_key_field(primary);
            }
            query.join_into(&mut other, &fk.foreign_field)?;
            return Ok(other);
        }
        if let Some(merged) = join_through_sources(&query, &other, session)? {
            return Ok(merged);
        }
        Err(QueryModelError::NoRelationshipFound {
            left: query.table_name().to_string(),
            right: other.table_name().to_string(),
        })
    }

    /// Rows of `self` with no matching row in `other`:
    /// `self.field NOT IN (SELECT other.field FROM other ...)`.
    pub fn anti_join(&self, other: &Query, session: &Session) -> Result<Query, QueryModelError> {
        let (own_field, other_field) = if let Some(fk) = find_foreign_key(self, other, session) {
            // self is the child: compare its foreign field with the parent key
            let key = fk
                .primary_field
                .or_else(|| other.key_field().map(str::to_string))
                .ok_or_else(|| QueryModelError::MissingPrimaryKey(other.table_name().to_string()))?;
            (fk.foreign_field, key)
        } else if let Some(fk) = find_foreign_key(other, self, session) {
            let key = fk
                .primary_field
                .or_else(|| self.key_field().map(str::to_string))
                .ok_or_else(|| QueryModelError::MissingPrimaryKey(self.table_name().to_string()))?;
            (key, fk.foreign_field)
        } else {
            return Err(QueryModelError::NoRelationshipFound {
                left: self.table_name().to_string(),
                right: other.table_name().to_string(),
            });
        };

        let mut sub = other.clone();
        sub.set_role(QueryRole::NotSelectIn);
        sub.set_join_type(JoinType::Inner);
        sub.set_values(
            ClauseKind::Select,
            vec![format!("{}.{}", sub.alias(), other_field)],
        );
        for kind in [ClauseKind::GroupBy, ClauseKind::OrderBy, ClauseKind::Limit] {
            sub.set_values(kind, Vec::new());
        }

        let mut query = self.clone();
        let condition = format!(
            "{}.{} NOT IN ({})",
            query.alias(),
            own_field,
            crate::generator::sql::render(&sub, session, true)
        );
        query.push(ClauseKind::Where, condition);
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_keys() -> Session {
        let session = Session::default();
        session.register_foreign_key("Class", "Student", "student_id", Some("id"));
        session.register_foreign_key("Class", "Teacher", "teacher_id", Some("id"));
        session
    }

    fn query(table: &str, select: &str, session: &Session) -> Query {
        let mut query = Query::new(table, session);
        query.push(ClauseKind::Select, select);
        query
    }

    #[test]
    fn test_merge_same_table_unions_clauses() {
        let session = Session::default();
        let mut a = query("Product p", "p.name", &session);
        a.push(ClauseKind::Where, "p.price > 10");
        let b = query("product prod", "prod.name, prod.price", &session);

        let merged = a.merge(&b, &session).unwrap();
        assert_eq!(merged.values(ClauseKind::Select), ["p.name", "p.price"]);
        assert_eq!(merged.values(ClauseKind::Where), ["p.price > 10"]);
    }

    #[test]
    fn test_merge_child_gains_join() {
        let session = session_with_keys();
        let class = query("Class c", "c.name", &session);
        let student = query("Student s", "s.name", &session);

        let merged = class.merge(&student, &session).unwrap();
        assert_eq!(merged.table_name(), "Class");
        assert_eq!(
            merged.values(ClauseKind::From),
            ["Class c", "JOIN Student s ON (c.student_id = s.id)"]
        );
        assert_eq!(merged.values(ClauseKind::Select), ["c.name", "s.name"]);

        // reversed operands: the child side still owns the join
        let reversed = student.merge(&class, &session).unwrap();
        assert_eq!(reversed.table_name(), "Class");
        assert_eq!(reversed, merged);
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let session = session_with_keys();
        let class = query("Class c", "c.name", &session);
        let student = query("Student s", "s.name", &session);
        let _ = class.merge(&student, &session).unwrap();
        assert_eq!(class.values(ClauseKind::From).len(), 1);
        assert!(student.key_field().is_none());
    }

    #[test]
    fn test_merge_without_relationship() {
        let session = Session::default();
        let a = query("Product p", "p.name", &session);
        let b = query("Vendor v", "v.name", &session);
        assert_eq!(
            a.merge(&b, &session),
            Err(QueryModelError::NoRelationshipFound {
                left: "Product".to_string(),
                right: "Vendor".to_string(),
            })
        );
    }

    #[test]
    fn test_merge_requires_primary_key() {
        let session = Session::default();
        session.register_foreign_key("Class", "Student", "student_id", None);
        let class = query("Class c", "c.name", &session);
        let student = query("Student s", "s.name", &session);
        assert_eq!(
            class.merge(&student, &session),
            Err(QueryModelError::MissingPrimaryKey("Student".to_string()))
        );
    }

    #[test]
    fn test_merge_through_joined_table() {
        let session = Session::default();
        session.register_foreign_key("Student", "Class", "class_id", Some("id"));
        session.register_foreign_key("Teacher", "Class", "class_id", Some("id"));
        let student = query("Student s", "s.name", &session);
        let class = query("Class c", "c.room", &session);
        let teacher = query("Teacher t", "t.name", &session);

        let left = student.merge(&class, &session).unwrap().merge(&teacher, &session).unwrap();
        let right = student
            .merge(&class.merge(&teacher, &session).unwrap(), &session)
            .unwrap();
        assert_eq!(
            left.values(ClauseKind::From),
            [
                "Student s",
                "JOIN Class c ON (s.class_id = c.id)",
                "JOIN Teacher t ON (t.class_id = c.id)"
            ]
        );
        assert_eq!(left.values(ClauseKind::From), right.values(ClauseKind::From));
        assert_eq!(left, right);
    }

    #[test]
    fn test_anti_join_parent_side() {
        let session = Session::default();
        session.register_foreign_key("Orders", "Customer", "customer_id", Some("id"));
        let customer = query("Customer c", "c.name", &session);
        let mut orders = Query::new("Orders o", &session);
        orders.push(ClauseKind::Where, "o.year = 2024");

        let result = customer.anti_join(&orders, &session).unwrap();
        assert_eq!(result.table_name(), "Customer");
        assert_eq!(
            result.values(ClauseKind::Where),
            ["c.id NOT IN (SELECT o.customer_id FROM Orders o WHERE o.year = 2024)"]
        );
    }
}
