use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::Dialect;
use crate::expression::{ExpressionError, Modifier};
use crate::generator::{self, GeneratorError, Language};
use crate::rules::{self, Rule, RuleError};

use super::alias::split_table_name;
use super::clause::{strip_prefix_ignore_case, ClauseKind, JoinType};
use super::normalize::{named_field_alias, normalize_field, strip_alias_prefixes};
use super::session::Session;

/// How a query behaves when it is attached to another one as a modifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryRole {
    /// Joined into the target on the modifier's field name
    #[default]
    Plain,
    /// `field IN (sub-select)`
    SelectIn,
    /// `field NOT IN (sub-select)`
    NotSelectIn,
}

/// A table reference plus clause-indexed fragment lists.
///
/// `clauses[From][0]` is always `"<table> <alias>"` once a table is set;
/// later FROM entries are join or extra-source fragments.
#[derive(Debug, Clone, Default)]
pub struct Query {
    table_name: String,
    alias: String,
    key_field: Option<String>,
    clauses: BTreeMap<ClauseKind, Vec<String>>,
    join_type: JoinType,
    role: QueryRole,
}

impl Query {
    /// `Query::new("Product p", &session)` or `Query::new("Product", &session)`
    /// (alias derived).
    pub fn new(table: &str, session: &Session) -> Self {
        let mut query = Self::default();
        query.set_table(table, session);
        query
    }

    /// A query without a table yet; `Table` modifiers fill it in.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_table(&mut self, table: &str, session: &Session) {
        let table = table.trim();
        if table.is_empty() {
            return;
        }
        let (name, alias) = split_table_name(table, session);
        let source = format!("{} {}", name, alias);
        self.table_name = name;
        self.alias = alias;
        let from = self.clauses.entry(ClauseKind::From).or_default();
        if from.is_empty() {
            from.push(source);
        } else {
            from[0] = source;
        }
    }

    pub fn has_table(&self) -> bool {
        !self.table_name.is_empty()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The alias, falling back to the table name.
    pub fn alias(&self) -> &str {
        if self.alias.is_empty() {
            &self.table_name
        } else {
            &self.alias
        }
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn set_key_field(&mut self, field: &str) {
        let field = field.trim();
        if !field.is_empty() {
            self.key_field = Some(field.to_string());
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn set_join_type(&mut self, join_type: JoinType) {
        self.join_type = join_type;
    }

    pub fn role(&self) -> QueryRole {
        self.role
    }

    pub fn set_role(&mut self, role: QueryRole) {
        self.role = role;
    }

    pub fn values(&self, kind: ClauseKind) -> &[String] {
        self.clauses.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn values_mut(&mut self, kind: ClauseKind) -> &mut Vec<String> {
        self.clauses.entry(kind).or_default()
    }

    pub fn set_values(&mut self, kind: ClauseKind, values: Vec<String>) {
        self.clauses.insert(kind, values);
    }

    /// Append a fragment as is.
    pub fn push(&mut self, kind: ClauseKind, fragment: impl Into<String>) {
        self.values_mut(kind).push(fragment.into());
    }

    /// Append a fragment unless an equivalent one is already stored.
    pub fn insert(&mut self, kind: ClauseKind, fragment: impl Into<String>) {
        let fragment = fragment.into();
        self.update_values(kind, std::slice::from_ref(&fragment));
    }

    pub fn is_empty(&self, kind: ClauseKind) -> bool {
        self.values(kind).is_empty()
    }

    /// Aliases declared by `expr AS name` SELECT fields.
    pub fn named_fields(&self) -> Vec<String> {
        self.values(ClauseKind::Select)
            .iter()
            .filter_map(|field| named_field_alias(field))
            .map(str::to_string)
            .collect()
    }

    fn field_set(&self, kind: ClauseKind, fragments: &[String], exact: bool) -> BTreeSet<String> {
        let named = self.named_fields();
        fragments
            .iter()
            .flat_map(|fragment| kind.split(fragment))
            .map(|field| {
                if named.iter().any(|n| n.eq_ignore_ascii_case(field.trim())) {
                    if exact {
                        field.trim().to_lowercase()
                    } else {
                        field.trim().to_string()
                    }
                } else {
                    normalize_field(kind, &field, exact, self.alias())
                }
            })
            .collect()
    }

    /// Compare `candidates` with the stored `kind` fragments.
    ///
    /// `exact = false` returns the normalized candidates missing from this
    /// query. `exact = true` returns the symmetric difference of the fully
    /// normalized forms (empty means equivalent).
    pub fn diff(&self, kind: ClauseKind, candidates: &[String], exact: bool) -> BTreeSet<String> {
        let incoming = self.field_set(kind, candidates, exact);
        let stored = self.field_set(kind, self.values(kind), exact);
        if exact {
            incoming.symmetric_difference(&stored).cloned().collect()
        } else {
            incoming.difference(&stored).cloned().collect()
        }
    }

    /// Append every atomic field of `fragments` not already present.
    ///
    /// LIMIT is never stacked: an existing LIMIT wins.
    pub fn update_values(&mut self, kind: ClauseKind, fragments: &[String]) {
        if kind == ClauseKind::Limit && !self.is_empty(ClauseKind::Limit) {
            return;
        }
        for field in fragments.iter().flat_map(|fragment| kind.split(fragment)) {
            let missing = self.diff(kind, std::slice::from_ref(&field), false);
            if !missing.is_empty() {
                self.push(kind, field);
            }
        }
    }

    /// Remove every fragment containing `search` from the given clauses.
    pub fn delete(&mut self, search: &str, kinds: &[ClauseKind]) {
        for kind in kinds {
            if let Some(values) = self.clauses.get_mut(kind) {
                values.retain(|item| !item.contains(search));
            }
        }
    }

    /// Whether `expr` references this query's alias.
    pub fn matches(&self, expr: &str) -> bool {
        let alias = self.alias();
        !alias.is_empty() && strip_alias_prefixes(expr, Some(alias)) != expr
    }

    /// Attach a modifier under `name`.
    pub fn apply(
        &mut self,
        name: &str,
        modifier: &dyn Modifier,
        session: &Session,
    ) -> Result<&mut Self, ExpressionError> {
        modifier.add(name, self, session)?;
        Ok(self)
    }

    /// Builder form of [`Query::apply`].
    pub fn with(
        mut self,
        name: &str,
        modifier: impl Modifier,
        session: &Session,
    ) -> Result<Self, ExpressionError> {
        modifier.add(name, &mut self, session)?;
        Ok(self)
    }

    /// Add plain fields, optionally also as ORDER BY and/or GROUP BY keys.
    pub fn add_fields(
        &mut self,
        fields: &[&str],
        order_by: bool,
        group_by: bool,
        session: &Session,
    ) -> Result<(), ExpressionError> {
        crate::expression::FieldList::plain(fields, order_by, group_by).add("", self, session)
    }

    /// Cap the number of rows returned, following the session dialect.
    ///
    /// Applying a limit twice keeps the first one.
    pub fn limit(&mut self, count: u32, offset: u32, session: &Session) -> &mut Self {
        match session.dialect() {
            Dialect::SqlServer => {
                if offset > 0 {
                    log::warn!("SQL Server TOP() ignores offset {}", offset);
                }
                let select = self.values_mut(ClauseKind::Select);
                if select.iter().any(|f| strip_prefix_ignore_case(f, "TOP(").is_some()) {
                    return self;
                }
                let top = format!("TOP({})", count);
                match select.first_mut() {
                    Some(first) => {
                        *first = match strip_prefix_ignore_case(first, "DISTINCT ") {
                            Some(rest) => format!("DISTINCT {} {}", top, rest.trim_start()),
                            None => format!("{} {}", top, first),
                        };
                    }
                    None => select.push(format!("{} *", top)),
                }
            }
            Dialect::Oracle => {
                let where_list = self.values_mut(ClauseKind::Where);
                if where_list.iter().any(|c| c.contains("ROWNUM")) {
                    return self;
                }
                if offset > 0 {
                    where_list.push(format!("ROWNUM > {}", offset));
                }
                where_list.push(format!("ROWNUM <= {}", offset.saturating_add(count)));
            }
            Dialect::Ansi | Dialect::Postgres | Dialect::MySql => {
                if self.is_empty(ClauseKind::Limit) {
                    let value = if offset > 0 {
                        format!("{} OFFSET {}", count, offset)
                    } else {
                        count.to_string()
                    };
                    self.push(ClauseKind::Limit, value);
                }
            }
        }
        self
    }

    /// Rewrite the query with `rules` in order, or with the default rule
    /// list when `None`.
    pub fn optimize(
        &mut self,
        rules: Option<&[Box<dyn Rule>]>,
        session: &Session,
    ) -> Result<(), RuleError> {
        match rules {
            Some(rules) => rules::optimize(self, rules, session),
            None => rules::optimize(self, &rules::default_rules(), session),
        }
    }

    pub fn translate_to(&self, language: Language, session: &Session) -> Result<String, GeneratorError> {
        language.render(self, session)
    }

    /// SQL text for `session`.
    pub fn to_sql(&self, session: &Session) -> String {
        generator::sql::render(self, session, false)
    }
}

/// Semantic equality: for every clause kind the exact diff is empty.
impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        ClauseKind::ALL
            .iter()
            .all(|kind| self.diff(*kind, other.values(*kind), true).is_empty())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(&Session::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn product(session: &Session) -> Query {
        let mut query = Query::new("Product p", session);
        query.push(ClauseKind::Select, "p.name");
        query.push(ClauseKind::Where, "p.category = 'Gizmo'");
        query
    }

    #[test]
    fn test_new_sets_first_from_entry() {
        let session = Session::default();
        let query = Query::new("Product", &session);
        assert_eq!(query.values(ClauseKind::From), ["Product pro"]);
        assert_eq!(query.alias(), "pro");
        assert_eq!(query.table_name(), "Product");
    }

    #[test]
    fn test_set_table_replaces_first_source() {
        let session = Session::default();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::From, "JOIN Vendor v ON (p.vendor_id = v.id)");
        query.set_table("Item i", &session);
        assert_eq!(query.values(ClauseKind::From)[0], "Item i");
        assert_eq!(query.values(ClauseKind::From).len(), 2);
    }

    #[test]
    fn test_insert_skips_duplicates() {
        let session = Session::default();
        let mut query = product(&session);
        query.insert(ClauseKind::Select, "name");
        query.insert(ClauseKind::Select, "p.name");
        query.insert(ClauseKind::Select, "p.price");
        assert_eq!(query.values(ClauseKind::Select), ["p.name", "p.price"]);
    }

    #[test]
    fn test_equality_ignores_alias_case_and_quotes() {
        let session = Session::default();
        let a = product(&session);
        let mut b = Query::new("Product prod", &session);
        b.push(ClauseKind::Select, "prod.NAME");
        b.push(ClauseKind::Where, "prod.category=\"gizmo\"");
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_inequality_on_extra_clause() {
        let session = Session::default();
        let a = product(&session);
        let mut b = product(&session);
        b.push(ClauseKind::OrderBy, "p.name");
        assert_ne!(a, b);
    }

    #[test]
    fn test_delete_removes_matching_fragments() {
        let session = Session::default();
        let mut query = product(&session);
        query.push(ClauseKind::Where, "p.price > 10");
        query.delete("price", &ClauseKind::USUAL);
        assert_eq!(query.values(ClauseKind::Where), ["p.category = 'Gizmo'"]);
    }

    #[test]
    fn test_matches_alias() {
        let session = Session::default();
        let query = product(&session);
        assert!(query.matches("p.name = 'x'"));
        assert!(!query.matches("pp.name = 'x'"));
        assert!(!query.matches("name = 'p.x'"));
    }

    #[test]
    fn test_limit_ansi() {
        let session = Session::default();
        let mut query = product(&session);
        query.limit(10, 20, &session).limit(5, 0, &session);
        assert_eq!(query.values(ClauseKind::Limit), ["10 OFFSET 20"]);
    }

    #[test]
    fn test_limit_sql_server() {
        let session = Session::new(SessionConfig {
            dialect: Dialect::SqlServer,
            ..Default::default()
        });
        let mut query = product(&session);
        query.limit(10, 0, &session).limit(10, 0, &session);
        assert_eq!(query.values(ClauseKind::Select), ["TOP(10) p.name"]);
        assert!(query.is_empty(ClauseKind::Limit));

        let mut bare = Query::new("Product p", &session);
        bare.limit(3, 0, &session);
        assert_eq!(bare.values(ClauseKind::Select), ["TOP(3) *"]);
    }

    #[test]
    fn test_limit_oracle_saturates() {
        let session = Session::new(SessionConfig {
            dialect: Dialect::Oracle,
            ..Default::default()
        });
        let mut query = Query::new("Product p", &session);
        query.limit(u32::MAX, 1, &session);
        assert_eq!(
            query.values(ClauseKind::Where),
            ["ROWNUM > 1".to_string(), format!("ROWNUM <= {}", u32::MAX)]
        );
    }

    #[test]
    fn test_limit_oracle() {
        let session = Session::new(SessionConfig {
            dialect: Dialect::Oracle,
            ..Default::default()
        });
        let mut query = product(&session);
        query.limit(10, 5, &session);
        assert_eq!(
            query.values(ClauseKind::Where),
            ["p.category = 'Gizmo'", "ROWNUM > 5", "ROWNUM <= 15"]
        );
    }
}
