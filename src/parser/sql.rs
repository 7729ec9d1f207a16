//! `SELECT ... FROM ... [JOIN ... ON ...] [WHERE ...] [GROUP BY ...]
//! [ORDER BY ...] [LIMIT ...]`, with nested `field [NOT] IN (SELECT ...)`.

use std::sync::LazyLock;

use regex::Regex;

use crate::expression::{format_field, qualify_condition};
use crate::generator::sql as sql_text;
use crate::query_model::{
    split_conditions, split_joins, split_top_level, ClauseKind, JoinFragment, JoinType, Query,
    QueryModelError, QueryRole, Session, SortType,
};

use super::lexer::{self, Token, TokenKind};
use super::{merge_all, ParserError, QueryParser};

static COMMENTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static AS_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+AS\s+").unwrap());
static TOP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(DISTINCT\s+)?TOP\s*\(\s*(\d+)\s*\)\s*").unwrap());

/// A nested `IN (SELECT ...)` replaced by a placeholder condition.
struct SubSelect {
    placeholder: String,
    field: String,
    query: Query,
}

impl SubSelect {
    fn condition(&self, session: &Session) -> String {
        let operator = match self.query.role() {
            QueryRole::NotSelectIn => "NOT IN",
            _ => "IN",
        };
        format!(
            "{} {} ({})",
            self.field,
            operator,
            sql_text::render(&self.query, session, true)
        )
    }
}

pub struct SqlParser<'s> {
    session: &'s Session,
}

impl<'s> SqlParser<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Parse every `field [NOT] IN (SELECT ...)` on its own and cut it out
    /// of the statement.
    fn extract_subselects(
        &self,
        text: &str,
        tokens: &[Token<'_>],
    ) -> Result<(String, Vec<SubSelect>), ParserError> {
        let mut rewritten = String::with_capacity(text.len());
        let mut subselects: Vec<SubSelect> = Vec::new();
        let mut last = 0;
        let mut i = 0;
        while i < tokens.len() {
            let opens_subselect = tokens[i].is_keyword("IN")
                && tokens.get(i + 1).is_some_and(|t| t.is("("))
                && tokens.get(i + 2).is_some_and(|t| t.is_keyword("SELECT"));
            if !opens_subselect {
                i += 1;
                continue;
            }
            let close = lexer::matching_close(tokens, i + 1)?;
            let negated = i > 0 && tokens[i - 1].is_keyword("NOT");
            let field_index = if negated {
                i.checked_sub(2)
            } else {
                i.checked_sub(1)
            };
            let field = field_index
                .map(|index| tokens[index])
                .filter(|token| token.kind == TokenKind::Word)
                .ok_or_else(|| {
                    ParserError::UnknownSyntax(format!("IN without a field at offset {}", tokens[i].start))
                })?;

            let inner = &text[tokens[i + 2].start..tokens[close].start];
            let mut query = merge_all(self.parse(inner)?, self.session)?;
            query.set_role(if negated {
                QueryRole::NotSelectIn
            } else {
                QueryRole::SelectIn
            });
            let placeholder = format!("__subselect_{}__", subselects.len());
            log::trace!("{} stands for a sub-select on {}", placeholder, field.text);

            rewritten.push_str(&text[last..field.start]);
            rewritten.push_str(&placeholder);
            last = tokens[close].end();
            subselects.push(SubSelect {
                placeholder,
                field: field.text.to_string(),
                query,
            });
            i = close + 1;
        }
        rewritten.push_str(&text[last..]);
        Ok((rewritten, subselects))
    }

    /// One query per table of the FROM clause; JOIN equalities register
    /// foreign keys.
    fn read_sources(&self, body: &str) -> Result<Vec<Query>, ParserError> {
        let body = AS_KEYWORD.replace_all(body, " ");
        let mut parts = split_joins(&body).into_iter();
        let head = parts.next().ok_or(QueryModelError::MissingTable)?;
        let mut tables = split_top_level(&head, ',').into_iter();
        let main_table = tables.next().ok_or(QueryModelError::MissingTable)?;

        let mut queries = vec![Query::new(&main_table, self.session)];
        for extra in tables {
            queries[0].push(ClauseKind::From, format!(", {}", extra));
        }

        for fragment in parts {
            let join =
                JoinFragment::parse(&fragment).ok_or_else(|| ParserError::UnknownSyntax(fragment.clone()))?;
            let Some(((child_alias, foreign), (parent_alias, primary))) = join.key_pair() else {
                log::debug!("join kept as text: {}", fragment);
                queries[0].push(ClauseKind::From, join.to_fragment());
                continue;
            };
            let mut joined = Query::new(&format!("{} {}", join.table, join.alias), self.session);
            joined.set_join_type(join.join_type);
            queries.push(joined);

            let child = find_alias(&queries, &child_alias)?;
            let parent = find_alias(&queries, &parent_alias)?;
            self.session.register_foreign_key(
                queries[child].table_name(),
                queries[parent].table_name(),
                &foreign,
                Some(&primary),
            );
            queries[parent].set_key_field(&primary);
            // the joined table holds the foreign field: the parent is joined
            // from the other side once merged
            let joined_index = queries.len() - 1;
            if child == joined_index && parent != joined_index {
                queries[parent].set_join_type(mirror(join.join_type));
            }
        }
        Ok(queries)
    }
}

fn find_alias(queries: &[Query], alias: &str) -> Result<usize, ParserError> {
    queries
        .iter()
        .position(|query| query.alias().eq_ignore_ascii_case(alias))
        .ok_or_else(|| ParserError::UnknownAlias(alias.to_string()))
}

fn mirror(join_type: JoinType) -> JoinType {
    match join_type {
        JoinType::Left => JoinType::Right,
        JoinType::Right => JoinType::Left,
        other => other,
    }
}

/// The query a fragment belongs to: alias prefix first, then a named
/// SELECT field, then the main query.
fn owner_of(queries: &[Query], fragment: &str) -> usize {
    if let Some(index) = queries.iter().position(|query| query.matches(fragment)) {
        return index;
    }
    let name = fragment.trim();
    queries
        .iter()
        .position(|query| {
            query
                .named_fields()
                .iter()
                .any(|named| named.eq_ignore_ascii_case(name))
        })
        .unwrap_or(0)
}

/// Clause keyword positions at bracket depth zero, as `(kind, body)`.
fn split_clauses<'t>(text: &'t str, tokens: &[Token<'t>]) -> Result<Vec<(ClauseKind, &'t str)>, ParserError> {
    let top = lexer::top_level(tokens);
    let mut marks: Vec<(ClauseKind, usize, usize)> = Vec::new();
    for (n, &i) in top.iter().enumerate() {
        let token = &tokens[i];
        let followed_by = |word: &str| top.get(n + 1).is_some_and(|&j| tokens[j].is_keyword(word));
        let (kind, body_token) = if token.is_keyword("SELECT") {
            (ClauseKind::Select, i + 1)
        } else if token.is_keyword("FROM") {
            (ClauseKind::From, i + 1)
        } else if token.is_keyword("WHERE") {
            (ClauseKind::Where, i + 1)
        } else if token.is_keyword("GROUP") && followed_by("BY") {
            (ClauseKind::GroupBy, i + 2)
        } else if token.is_keyword("ORDER") && followed_by("BY") {
            (ClauseKind::OrderBy, i + 2)
        } else if token.is_keyword("LIMIT") {
            (ClauseKind::Limit, i + 1)
        } else {
            continue;
        };
        let body_start = tokens.get(body_token).map_or(text.len(), |t| t.start);
        marks.push((kind, token.start, body_start));
    }

    match marks.first() {
        Some((ClauseKind::Select, 0, _)) => {}
        _ => {
            let head: String = text.chars().take(40).collect();
            return Err(ParserError::UnknownSyntax(head));
        }
    }
    let mut clauses = Vec::with_capacity(marks.len());
    for (n, &(kind, _, body_start)) in marks.iter().enumerate() {
        let end = marks.get(n + 1).map_or(text.len(), |&(_, start, _)| start);
        let body = text.get(body_start..end).unwrap_or_default().trim();
        clauses.push((kind, body));
    }
    Ok(clauses)
}

/// `n`, `n OFFSET o` or MySQL's `o, n`.
fn parse_limit(body: &str) -> Option<(u32, u32)> {
    let words: Vec<&str> = body
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
        .collect();
    match words.as_slice() {
        [count] => Some((count.parse().ok()?, 0)),
        [count, keyword, offset] if keyword.eq_ignore_ascii_case("OFFSET") => {
            Some((count.parse().ok()?, offset.parse().ok()?))
        }
        [offset, count] if body.contains(',') => Some((count.parse().ok()?, offset.parse().ok()?)),
        _ => None,
    }
}

impl QueryParser for SqlParser<'_> {
    fn evaluate(&self, text: &str, tokens: &[Token<'_>]) -> Result<Vec<Query>, ParserError> {
        let (rewritten, subselects) = self.extract_subselects(text, tokens)?;
        let cleaned = COMMENTS.replace_all(&rewritten, " ");
        let cleaned = cleaned.trim().trim_end_matches(';').trim_end();
        let tokens = lexer::tokenize(cleaned)?;
        let clauses = split_clauses(cleaned, &tokens)?;

        let from = clauses
            .iter()
            .find(|(kind, _)| *kind == ClauseKind::From)
            .map(|(_, body)| *body)
            .ok_or(QueryModelError::MissingTable)?;
        let mut queries = self.read_sources(from)?;
        let mut top: Option<u32> = None;

        for (kind, body) in clauses {
            match kind {
                ClauseKind::From => {}
                ClauseKind::Select => {
                    for (n, field) in split_top_level(body, ',').into_iter().enumerate() {
                        let mut field = field;
                        if n == 0 {
                            if let Some(captures) = TOP_PREFIX.captures(&field) {
                                top = captures.get(2).and_then(|m| m.as_str().parse().ok());
                                let distinct = captures.get(1).map_or("", |m| m.as_str());
                                field = format!("{}{}", distinct, &field[captures[0].len()..]);
                            }
                        }
                        if field.trim() == "*" {
                            continue;
                        }
                        let owner = owner_of(&queries, &field);
                        let formatted = format_field(&field, &queries[owner]);
                        queries[owner].push(ClauseKind::Select, formatted);
                    }
                }
                ClauseKind::Where => {
                    for condition in split_conditions(body) {
                        if let Some(sub) = subselects.iter().find(|s| s.placeholder == condition) {
                            let owner = owner_of(&queries, &sub.field);
                            queries[owner].apply(&sub.field, &sub.query, self.session)?;
                            continue;
                        }
                        let mut condition = condition;
                        for sub in &subselects {
                            if condition.contains(&sub.placeholder) {
                                condition = condition.replace(&sub.placeholder, &sub.condition(self.session));
                            }
                        }
                        if condition.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("ROWNUM")) {
                            queries[0].push(ClauseKind::Where, condition);
                            continue;
                        }
                        let owner = owner_of(&queries, &condition);
                        let qualified = qualify_condition(&condition, &queries[owner]);
                        queries[owner].push(ClauseKind::Where, qualified);
                    }
                }
                ClauseKind::GroupBy => {
                    for field in split_top_level(body, ',') {
                        let owner = owner_of(&queries, &field);
                        let formatted = format_field(&field, &queries[owner]);
                        queries[owner].push(ClauseKind::GroupBy, formatted);
                    }
                }
                ClauseKind::OrderBy => {
                    for fragment in split_top_level(body, ',') {
                        let (field, sort) = SortType::split_fragment(&fragment);
                        let owner = owner_of(&queries, field);
                        let formatted = format!("{}{}", format_field(field, &queries[owner]), sort.suffix());
                        queries[owner].push(ClauseKind::OrderBy, formatted);
                    }
                }
                ClauseKind::Limit => {
                    let (count, offset) =
                        parse_limit(body).ok_or_else(|| ParserError::UnknownSyntax(format!("LIMIT {}", body)))?;
                    queries[0].limit(count, offset, self.session);
                }
            }
        }
        if let Some(count) = top {
            queries[0].limit(count, 0, self.session);
        }
        log::debug!("sql: {} queries from {} tokens", queries.len(), tokens.len());
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dialect, SessionConfig};
    use crate::expression::Where;

    fn parse(text: &str, session: &Session) -> Vec<Query> {
        SqlParser::new(session).parse(text).unwrap()
    }

    #[test]
    fn test_single_table() {
        let session = Session::default();
        let queries = parse(
            "SELECT p.name, p.price FROM Product p WHERE p.price > 10 AND p.category = 'Gizmo' \
             ORDER BY p.price DESC LIMIT 5 OFFSET 10",
            &session,
        );
        assert_eq!(queries.len(), 1);
        let query = &queries[0];
        assert_eq!(query.table_name(), "Product");
        assert_eq!(query.values(ClauseKind::Select), ["p.name", "p.price"]);
        assert_eq!(
            query.values(ClauseKind::Where),
            ["p.price > 10", "p.category = 'Gizmo'"]
        );
        assert_eq!(query.values(ClauseKind::OrderBy), ["p.price DESC"]);
        assert_eq!(query.values(ClauseKind::Limit), ["5 OFFSET 10"]);
    }

    #[test]
    fn test_unqualified_fields_and_comments() {
        let session = Session::default();
        let queries = parse("select name /* shown */ from Product where price > 10;", &session);
        assert_eq!(queries[0].values(ClauseKind::Select), ["pro.name"]);
        assert_eq!(queries[0].values(ClauseKind::Where), ["pro.price > 10"]);
    }

    #[test]
    fn test_join_registers_foreign_key() {
        let session = Session::default();
        let queries = parse(
            "SELECT p.name, v.name as vendor FROM Product p \
             LEFT JOIN Vendor AS v ON p.vendor_id = v.id WHERE v.country = 'BR'",
            &session,
        );
        assert_eq!(queries.len(), 2);
        let relationship = session.find_foreign_key("Product", "Vendor").unwrap();
        assert_eq!(relationship.foreign_field, "vendor_id");
        assert_eq!(relationship.primary_field.as_deref(), Some("id"));

        let vendor = &queries[1];
        assert_eq!(vendor.key_field(), Some("id"));
        assert_eq!(vendor.join_type(), JoinType::Left);
        assert_eq!(vendor.values(ClauseKind::Select), ["v.name as vendor"]);
        assert_eq!(vendor.values(ClauseKind::Where), ["v.country = 'BR'"]);

        let merged = merge_all(queries, &session).unwrap();
        assert_eq!(
            merged.values(ClauseKind::From),
            ["Product p", "LEFT JOIN Vendor v ON (p.vendor_id = v.id)"]
        );
    }

    #[test]
    fn test_join_from_parent_side() {
        let session = Session::default();
        let queries = parse(
            "SELECT v.name FROM Vendor v LEFT JOIN Product p ON (p.vendor_id = v.id)",
            &session,
        );
        let merged = merge_all(queries, &session).unwrap();
        assert_eq!(merged.table_name(), "Product");
        assert_eq!(
            merged.values(ClauseKind::From),
            ["Product p", "RIGHT JOIN Vendor v ON (p.vendor_id = v.id)"]
        );
    }

    #[test]
    fn test_unknown_alias() {
        let session = Session::default();
        let result = SqlParser::new(&session)
            .parse("SELECT * FROM Product p JOIN Vendor v ON x.vendor_id = v.id");
        assert_eq!(result.err(), Some(ParserError::UnknownAlias("x".to_string())));
    }

    #[test]
    fn test_nested_select_in() {
        let session = Session::default();
        let queries = parse(
            "SELECT m.title FROM Movie m WHERE m.id IN (SELECT r.movie_id FROM Review r \
             WHERE (r.rate > 4.5)) AND m.id NOT IN (SELECT g.movie_id FROM Genres g \
             WHERE g.name = 'Horror') AND m.year > 2000",
            &session,
        );
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].values(ClauseKind::Where),
            [
                "m.id IN (SELECT r.movie_id FROM Review r WHERE (r.rate > 4.5))",
                "m.id NOT IN (SELECT g.movie_id FROM Genres g WHERE g.name = 'Horror')",
                "m.year > 2000"
            ]
        );
    }

    #[test]
    fn test_select_in_inside_or_group() {
        let session = Session::default();
        let queries = parse(
            "SELECT m.title FROM Movie m WHERE (m.id IN (SELECT r.movie_id FROM Review r) OR m.year > 2000)",
            &session,
        );
        assert_eq!(
            queries[0].values(ClauseKind::Where),
            ["(m.id IN (SELECT r.movie_id FROM Review r) OR m.year > 2000)"]
        );
    }

    #[test]
    fn test_or_group_stays_whole() {
        let session = Session::default();
        let queries = parse(
            "SELECT * FROM Product p WHERE (p.category='Gizmo' OR p.category='Gadget')",
            &session,
        );
        assert!(queries[0].is_empty(ClauseKind::Select));
        let mut expected = Query::new("Product p", &session);
        expected
            .apply(
                "OR",
                &crate::expression::Options::new()
                    .with("category", Where::eq("Gizmo").unwrap())
                    .with("category", Where::eq("Gadget").unwrap()),
                &session,
            )
            .unwrap();
        assert_eq!(queries[0], expected);
    }

    #[test]
    fn test_group_and_named_order() {
        let session = Session::default();
        let queries = parse(
            "SELECT s.region, SUM(s.value) as total FROM Sales s GROUP BY s.region ORDER BY total DESC",
            &session,
        );
        let query = &queries[0];
        assert_eq!(query.values(ClauseKind::GroupBy), ["s.region"]);
        assert_eq!(query.values(ClauseKind::OrderBy), ["total DESC"]);
    }

    #[test]
    fn test_sql_server_top() {
        let session = Session::new(SessionConfig {
            dialect: Dialect::SqlServer,
            ..Default::default()
        });
        let queries = parse("SELECT TOP(10) p.name FROM Product p", &session);
        assert_eq!(queries[0].values(ClauseKind::Select), ["TOP(10) p.name"]);
    }

    #[test]
    fn test_round_trip() {
        let session = Session::default();
        session.register_foreign_key("Product", "Vendor", "vendor_id", Some("id"));
        let vendor = Query::new("Vendor v", &session)
            .with("name", crate::expression::NamedField::new("vendor"), &session)
            .unwrap();
        let mut product = Query::new("Product p", &session);
        product.push(ClauseKind::Select, "p.name");
        product.push(ClauseKind::Where, "p.price BETWEEN 10 AND 20");
        product.push(ClauseKind::OrderBy, "p.name");
        product.limit(20, 0, &session);
        let original = product.merge(&vendor, &session).unwrap();

        let text = original.to_sql(&session);
        let parsed = merge_all(parse(&text, &session), &session).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.to_sql(&session), text);
    }

    #[test]
    fn test_missing_select() {
        let session = Session::default();
        assert!(matches!(
            SqlParser::new(&session).parse("FROM Product p"),
            Err(ParserError::UnknownSyntax(_))
        ));
    }

    #[test]
    fn test_limit_forms() {
        assert_eq!(parse_limit("10"), Some((10, 0)));
        assert_eq!(parse_limit("10 OFFSET 5"), Some((10, 5)));
        assert_eq!(parse_limit("5, 10"), Some((10, 5)));
        assert_eq!(parse_limit("ten"), None);
    }
}
