use std::fmt;

use crate::query_model::normalize::{is_numeric_literal, named_field_alias};
use crate::query_model::{ClauseKind, Query, QueryModelError, Session, SortType};

use super::{ExpressionError, Modifier};

/// Qualify a bare field name with the query alias.
///
/// Left untouched: `*` (or `_`), names already carrying a qualifier, a call,
/// a literal or an operator, and names declared as `... AS name` in SELECT.
pub fn format_field(name: &str, query: &Query) -> String {
    let name = name.trim();
    if name == "_" || name == "*" {
        return "*".to_string();
    }
    let is_expression = name.chars().any(|c| {
        c.is_whitespace() || matches!(c, '.' | '(' | ')' | '\'' | '"' | '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '|')
    });
    if is_expression || is_numeric_literal(name) || name.is_empty() {
        return name.to_string();
    }
    if query
        .values(ClauseKind::Select)
        .iter()
        .filter_map(|field| named_field_alias(field))
        .any(|alias| alias.eq_ignore_ascii_case(name))
    {
        return name.to_string();
    }
    if query.alias().is_empty() {
        return name.to_string();
    }
    format!("{}.{}", query.alias(), name)
}

/// Qualify the leading field of a condition such as `price > 10` or
/// `NOT name LIKE 'a%'`.
pub fn qualify_condition(condition: &str, query: &Query) -> String {
    let condition = condition.trim();
    let (prefix, body) = match condition.get(..4) {
        Some(head) if head.eq_ignore_ascii_case("NOT ") => ("NOT ", condition[4..].trim_start()),
        _ => ("", condition),
    };
    let end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let (identifier, rest) = body.split_at(end);
    if identifier.is_empty()
        || identifier.chars().next().is_some_and(|c| c.is_ascii_digit())
        || rest.starts_with('.')
        || rest.trim_start().starts_with('(')
    {
        return condition.to_string();
    }
    format!("{}{}{}", prefix, format_field(identifier, query), rest)
}

/// Turns a field name into a SELECT expression.
pub trait FieldFormat: fmt::Debug {
    fn format(&self, name: &str, query: &Query, session: &Session) -> String;
}

/// A plain SELECT field.
#[derive(Debug, Clone, Copy, Default)]
pub struct Field;

impl FieldFormat for Field {
    fn format(&self, name: &str, query: &Query, _session: &Session) -> String {
        format_field(name, query)
    }
}

impl Modifier for Field {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = self.format(name, query, session);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// `DISTINCT field`
#[derive(Debug, Clone, Copy, Default)]
pub struct Distinct;

impl FieldFormat for Distinct {
    fn format(&self, name: &str, query: &Query, _session: &Session) -> String {
        format!("DISTINCT {}", format_field(name, query))
    }
}

impl Modifier for Distinct {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = self.format(name, query, session);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// `expression as alias`, the expression produced by `inner`.
#[derive(Debug)]
pub struct NamedField {
    alias: String,
    inner: Box<dyn FieldFormat>,
}

impl NamedField {
    pub fn new(alias: &str) -> Self {
        Self::with(alias, Field)
    }

    pub fn with(alias: &str, inner: impl FieldFormat + 'static) -> Self {
        Self {
            alias: alias.trim().to_string(),
            inner: Box::new(inner),
        }
    }
}

impl Modifier for NamedField {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = format!("{} as {}", self.inner.format(name, query, session), self.alias);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// A SELECT expression from a template.
///
/// `{af}`, `{a.f}` and `%` expand to `alias.field`; `{a}`, `{f}` and `{t}`
/// to the alias, the field and the table name.
#[derive(Debug, Clone)]
pub struct ExpressionField {
    template: String,
}

impl ExpressionField {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn format(&self, name: &str, query: &Query) -> String {
        self.template
            .replace("{af}", "{a}.{f}")
            .replace("{a.f}", "{a}.{f}")
            .replace('%', "{a}.{f}")
            .replace("{a}", query.alias())
            .replace("{f}", name.trim())
            .replace("{t}", query.table_name())
    }
}

impl FieldFormat for ExpressionField {
    fn format(&self, name: &str, query: &Query, _session: &Session) -> String {
        ExpressionField::format(self, name, query)
    }
}

impl Modifier for ExpressionField {
    fn add(&self, name: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        let field = self.format(name, query);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// The same modifiers applied to several fields.
pub struct FieldList {
    fields: Vec<String>,
    modifiers: Vec<Box<dyn Modifier>>,
}

impl FieldList {
    /// Comma-separated field names, added as plain SELECT fields.
    pub fn new(fields: &str) -> Self {
        Self::with_modifiers(fields, vec![Box::new(Field)])
    }

    pub fn with_modifiers(fields: &str, modifiers: Vec<Box<dyn Modifier>>) -> Self {
        Self {
            fields: fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
            modifiers,
        }
    }

    /// SELECT fields, optionally also ORDER BY and GROUP BY keys.
    pub fn plain(fields: &[&str], order_by: bool, group_by: bool) -> Self {
        let mut modifiers: Vec<Box<dyn Modifier>> = vec![Box::new(Field)];
        if order_by {
            modifiers.push(Box::new(OrderBy::default()));
        }
        if group_by {
            modifiers.push(Box::new(GroupBy));
        }
        Self {
            fields: fields.iter().map(|f| f.trim().to_string()).collect(),
            modifiers,
        }
    }
}

impl fmt::Debug for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldList")
            .field("fields", &self.fields)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}

impl Modifier for FieldList {
    fn add(&self, _name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        for field in &self.fields {
            for modifier in &self.modifiers {
                modifier.add(field, query, session)?;
            }
        }
        Ok(())
    }
}

/// Sets the table of the target to the field name, then adds `fields`.
#[derive(Debug, Default)]
pub struct Table {
    fields: Option<FieldList>,
}

impl Table {
    pub fn new(fields: &str) -> Self {
        Self {
            fields: Some(FieldList::new(fields)),
        }
    }
}

impl Modifier for Table {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        query.set_table(name, session);
        match &self.fields {
            Some(fields) => fields.add(name, query, session),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryKey;

impl Modifier for PrimaryKey {
    fn add(&self, name: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        query.set_key_field(name);
        Ok(())
    }
}

/// Declares that the field references `parent_table`.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    parent_table: String,
    primary_field: Option<String>,
}

impl ForeignKey {
    pub fn new(parent_table: &str) -> Self {
        Self {
            parent_table: parent_table.trim().to_string(),
            primary_field: None,
        }
    }

    pub fn references(mut self, primary_field: &str) -> Self {
        self.primary_field = Some(primary_field.trim().to_string());
        self
    }
}

impl Modifier for ForeignKey {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        if !query.has_table() {
            return Err(QueryModelError::MissingTable.into());
        }
        session.register_foreign_key(
            query.table_name(),
            &self.parent_table,
            name.trim(),
            self.primary_field.as_deref(),
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupBy;

impl Modifier for GroupBy {
    fn add(&self, name: &str, query: &mut Query, _session: &Session) -> Result<(), ExpressionError> {
        let field = format_field(name, query);
        query.push(ClauseKind::GroupBy, field);
        Ok(())
    }
}

/// ORDER BY the field. `_2` orders by the second output column.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBy {
    sort: Option<SortType>,
}

impl OrderBy {
    pub fn asc() -> Self {
        Self {
            sort: Some(SortType::Asc),
        }
    }

    pub fn desc() -> Self {
        Self {
            sort: Some(SortType::Desc),
        }
    }
}

impl Modifier for OrderBy {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let name = name.trim();
        let field = match name.strip_prefix('_') {
            Some(position) if !position.is_empty() && position.chars().all(|c| c.is_ascii_digit()) => {
                position.to_string()
            }
            _ => format_field(name, query),
        };
        let sort = self.sort.unwrap_or(session.config().sort);
        query.push(ClauseKind::OrderBy, format!("{}{}", field, sort.suffix()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(session: &Session) -> Query {
        Query::new("Person p", session)
    }

    #[test]
    fn test_format_field() {
        let session = Session::default();
        let mut query = person(&session);
        query.push(ClauseKind::Select, "Count(*) as total");

        assert_eq!(format_field("name", &query), "p.name");
        assert_eq!(format_field("_", &query), "*");
        assert_eq!(format_field("x.name", &query), "x.name");
        assert_eq!(format_field("Count(id)", &query), "Count(id)");
        assert_eq!(format_field("42", &query), "42");
        assert_eq!(format_field("total", &query), "total");
    }

    #[test]
    fn test_qualify_condition() {
        let session = Session::default();
        let query = person(&session);
        assert_eq!(qualify_condition("age > 18", &query), "p.age > 18");
        assert_eq!(qualify_condition("NOT name LIKE 'a%'", &query), "NOT p.name LIKE 'a%'");
        assert_eq!(qualify_condition("x.age > 18", &query), "x.age > 18");
        assert_eq!(qualify_condition("YEAR(born) = 2000", &query), "YEAR(born) = 2000");
    }

    #[test]
    fn test_named_and_expression_fields() {
        let session = Session::default();
        let query = person(&session)
            .with("name", NamedField::new("person_name"), &session)
            .unwrap()
            .with("age", ExpressionField::new("{t}_{f}: % + 1"), &session)
            .unwrap();
        assert_eq!(
            query.values(ClauseKind::Select),
            ["p.name as person_name", "Person_age: p.age + 1"]
        );
    }

    #[test]
    fn test_table_and_field_list() {
        let session = Session::default();
        let query = Query::empty()
            .with("person", Table::new("name, age"), &session)
            .unwrap();
        assert_eq!(query.table_name(), "person");
        assert_eq!(query.values(ClauseKind::Select), ["per.name", "per.age"]);
    }

    #[test]
    fn test_field_list_with_sort_and_group() {
        let session = Session::default();
        let mut query = person(&session);
        query.add_fields(&["city", "state"], true, true, &session).unwrap();
        assert_eq!(query.values(ClauseKind::Select), ["p.city", "p.state"]);
        assert_eq!(query.values(ClauseKind::OrderBy), ["p.city", "p.state"]);
        assert_eq!(query.values(ClauseKind::GroupBy), ["p.city", "p.state"]);
    }

    #[test]
    fn test_order_by_position_and_direction() {
        let session = Session::default();
        let query = person(&session)
            .with("_2", OrderBy::default(), &session)
            .unwrap()
            .with("age", OrderBy::desc(), &session)
            .unwrap();
        assert_eq!(query.values(ClauseKind::OrderBy), ["2", "p.age DESC"]);
    }

    #[test]
    fn test_foreign_key_registers_relationship() {
        let session = Session::default();
        let _ = Query::new("Orders o", &session)
            .with("customer_id", ForeignKey::new("Customer").references("id"), &session)
            .unwrap();
        let found = session.find_foreign_key("orders", "customer").unwrap();
        assert_eq!(found.foreign_field, "customer_id");

        let missing = Query::empty().with("x", ForeignKey::new("Customer"), &session);
        assert!(matches!(
            missing,
            Err(ExpressionError::QueryModel(QueryModelError::MissingTable))
        ));
    }
}
