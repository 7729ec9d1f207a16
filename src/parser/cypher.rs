//! Cypher: `MATCH (a:Label{key: value})-[:TYPE]->(b:Label) WHERE ... RETURN ...
//! ORDER BY ... SKIP n LIMIT m`.
//!
//! Every labelled node or relationship becomes a query. Arrows point from
//! the child to the parent, and keys follow a fixed naming: the child holds
//! `{parent table}_id`, the parent `id`. A relationship is the child of
//! both of its nodes.

use std::sync::LazyLock;

use regex::Regex;

use crate::query_model::{split_conditions, split_top_level, ClauseKind, Query, Session};

use super::lexer::{self, Token, TokenKind};
use super::{ParserError, QueryParser};

static IN_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bIN\s*\[([^\]]*)\]").unwrap());
static STRING_MATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(NOT\s+)?(\S+)\s+(STARTS\s+WITH|ENDS\s+WITH|CONTAINS)\s+'([^']*)'$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Match,
    Where,
    Return,
    OrderBy,
    Skip,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrow {
    Left,
    Right,
}

/// Position inside one comma-separated path of a MATCH pattern.
#[derive(Debug, Default)]
struct Path {
    previous: Option<usize>,
    edge: Option<usize>,
    arrow: Option<Arrow>,
}

pub struct CypherParser<'s> {
    session: &'s Session,
}

impl<'s> CypherParser<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn read_pattern(&self, text: &str, tokens: &[Token<'_>], queries: &mut Vec<Query>) -> Result<(), ParserError> {
        let mut path = Path::default();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if token.is("(") || token.is("[") {
                let close = lexer::matching_close(tokens, i)?;
                let found = self.read_element(text, &tokens[i..=close], queries)?;
                if token.is("[") {
                    path.edge = found;
                } else {
                    let node = found.ok_or_else(|| {
                        ParserError::UnknownSyntax(format!("anonymous node at offset {}", token.start))
                    })?;
                    if let Some(previous) = path.previous {
                        self.link(previous, node, &path, queries);
                    }
                    path = Path {
                        previous: Some(node),
                        ..Default::default()
                    };
                }
                i = close + 1;
                continue;
            }
            if token.is("->") {
                path.arrow = Some(Arrow::Right);
            } else if token.is("<-") {
                path.arrow = Some(Arrow::Left);
            } else if token.is(",") {
                path = Path::default();
            } else if !token.is("-") {
                return Err(unexpected(&token));
            }
            i += 1;
        }
        Ok(())
    }

    /// `(alias:Label{...})`, `[alias:TYPE]` or a bare `(alias)`; `tokens`
    /// includes both brackets.
    fn read_element(
        &self,
        text: &str,
        tokens: &[Token<'_>],
        queries: &mut Vec<Query>,
    ) -> Result<Option<usize>, ParserError> {
        let inner = &tokens[1..tokens.len() - 1];
        let mut pos = 0;
        let mut alias = None;
        if let Some(token) = inner.first().filter(|t| t.kind == TokenKind::Word) {
            alias = Some(token.text);
            pos = 1;
        }
        let mut label = None;
        if inner.get(pos).is_some_and(|t| t.is(":")) {
            let token = inner
                .get(pos + 1)
                .filter(|t| t.kind == TokenKind::Word)
                .ok_or_else(|| match inner.get(pos + 1) {
                    Some(token) => unexpected(token),
                    None => unexpected(&inner[pos]),
                })?;
            label = Some(token.text);
            pos += 2;
        }

        let index = match (label, alias) {
            (Some(label), alias) => {
                let name = match alias {
                    Some(alias) => format!("{} {}", label, alias),
                    None => label.to_string(),
                };
                queries.push(Query::new(&name, self.session));
                queries.len() - 1
            }
            (None, Some(alias)) => queries
                .iter()
                .position(|query| query.alias().eq_ignore_ascii_case(alias))
                .ok_or_else(|| ParserError::UnknownAlias(alias.to_string()))?,
            (None, None) => return Ok(None),
        };

        if inner.get(pos).is_some_and(|t| t.is("{")) {
            let close = lexer::matching_close(inner, pos)?;
            let body = &text[inner[pos].end()..inner[close].start];
            let query = &mut queries[index];
            for property in split_top_level(body, ',') {
                let (key, value) = property
                    .split_once(':')
                    .ok_or_else(|| ParserError::UnknownSyntax(property.clone()))?;
                let value = value.trim();
                let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
                    Some(unquoted) => format!("'{}'", unquoted),
                    None => value.to_string(),
                };
                let condition = format!("{}.{} = {}", query.alias(), key.trim(), value);
                query.push(ClauseKind::Where, condition);
            }
            pos = close + 1;
        }
        if let Some(token) = inner.get(pos) {
            return Err(unexpected(token));
        }
        Ok(Some(index))
    }

    fn link(&self, previous: usize, node: usize, path: &Path, queries: &mut [Query]) {
        match (path.edge, path.arrow) {
            (Some(edge), _) => {
                self.register(queries, edge, previous);
                self.register(queries, edge, node);
            }
            (None, Some(Arrow::Right)) => self.register(queries, previous, node),
            (None, Some(Arrow::Left)) => self.register(queries, node, previous),
            (None, None) => log::debug!(
                "undirected edge between {} and {} left unlinked",
                queries[previous].alias(),
                queries[node].alias()
            ),
        }
    }

    fn register(&self, queries: &mut [Query], child: usize, parent: usize) {
        let foreign = format!("{}_id", queries[parent].table_name().to_lowercase());
        self.session.register_foreign_key(
            queries[child].table_name(),
            queries[parent].table_name(),
            &foreign,
            Some("id"),
        );
        queries[parent].set_key_field("id");
    }
}

fn unexpected(token: &Token<'_>) -> ParserError {
    ParserError::UnexpectedToken {
        token: token.text.to_string(),
        offset: token.start,
    }
}

fn owner_of(queries: &[Query], fragment: &str) -> usize {
    queries
        .iter()
        .position(|query| query.matches(fragment))
        .unwrap_or(0)
}

/// SQL spelling of a Cypher condition.
fn to_sql_condition(condition: &str) -> String {
    let condition = IN_LIST.replace_all(condition.trim(), "IN ($1)").into_owned();
    let Some(captures) = STRING_MATCH.captures(&condition) else {
        return condition;
    };
    let operator = captures[3].to_uppercase();
    let value = &captures[4];
    let pattern = if operator.starts_with("STARTS") {
        format!("{}%", value)
    } else if operator.starts_with("ENDS") {
        format!("%{}", value)
    } else {
        format!("%{}%", value)
    };
    let negation = if captures.get(1).is_some() { "NOT " } else { "" };
    format!("{} {}LIKE '{}'", &captures[2], negation, pattern)
}

fn sections(tokens: &[Token<'_>]) -> Result<Vec<(Section, usize, usize)>, ParserError> {
    let top = lexer::top_level(tokens);
    let mut marks = Vec::new();
    for (n, &i) in top.iter().enumerate() {
        let token = &tokens[i];
        let followed_by_by = top.get(n + 1).is_some_and(|&j| tokens[j].is_keyword("BY"));
        let (section, body) = if token.is_keyword("MATCH") {
            (Section::Match, i + 1)
        } else if token.is_keyword("WHERE") {
            (Section::Where, i + 1)
        } else if token.is_keyword("RETURN") {
            (Section::Return, i + 1)
        } else if token.is_keyword("ORDER") && followed_by_by {
            (Section::OrderBy, i + 2)
        } else if token.is_keyword("SKIP") {
            (Section::Skip, i + 1)
        } else if token.is_keyword("LIMIT") {
            (Section::Limit, i + 1)
        } else {
            continue;
        };
        marks.push((section, i, body));
    }
    match marks.first() {
        Some((Section::Match, 0, _)) => {}
        _ => {
            let head = tokens.first().map_or("", |t| t.text);
            return Err(ParserError::UnknownSyntax(format!("expected MATCH, found '{}'", head)));
        }
    }
    // (section, first body token, end token)
    let mut result = Vec::with_capacity(marks.len());
    for (n, &(section, _, body)) in marks.iter().enumerate() {
        let end = marks.get(n + 1).map_or(tokens.len(), |&(_, keyword, _)| keyword);
        result.push((section, body.min(end), end));
    }
    Ok(result)
}

fn parse_count(tokens: &[Token<'_>]) -> Result<u32, ParserError> {
    match tokens {
        [token] if token.kind == TokenKind::Number => token
            .text
            .parse()
            .map_err(|_| unexpected(token)),
        [token, ..] => Err(unexpected(token)),
        [] => Err(ParserError::UnknownSyntax("missing row count".to_string())),
    }
}

impl QueryParser for CypherParser<'_> {
    fn evaluate(&self, text: &str, tokens: &[Token<'_>]) -> Result<Vec<Query>, ParserError> {
        let mut queries: Vec<Query> = Vec::new();
        let mut skip: Option<u32> = None;
        let mut limit: Option<u32> = None;
        let body_text = |start: usize, end: usize| -> &str {
            match (tokens.get(start), end.checked_sub(1).and_then(|last| tokens.get(last))) {
                (Some(first), Some(last)) if start < end => &text[first.start..last.end()],
                _ => "",
            }
        };

        for (section, start, end) in sections(tokens)? {
            match section {
                Section::Match => self.read_pattern(text, &tokens[start..end], &mut queries)?,
                Section::Where => {
                    for condition in split_conditions(body_text(start, end)) {
                        let condition = to_sql_condition(&condition);
                        let owner = owner_of(&queries, &condition);
                        if let Some(query) = queries.get_mut(owner) {
                            query.push(ClauseKind::Where, condition);
                        }
                    }
                }
                Section::Return => {
                    for item in split_top_level(body_text(start, end), ',') {
                        if queries.iter().any(|q| q.alias().eq_ignore_ascii_case(&item)) {
                            continue;
                        }
                        let owner = owner_of(&queries, &item);
                        if let Some(query) = queries.get_mut(owner) {
                            query.push(ClauseKind::Select, item);
                        }
                    }
                }
                Section::OrderBy => {
                    for item in split_top_level(body_text(start, end), ',') {
                        let owner = owner_of(&queries, &item);
                        if let Some(query) = queries.get_mut(owner) {
                            query.push(ClauseKind::OrderBy, item);
                        }
                    }
                }
                Section::Skip => skip = Some(parse_count(&tokens[start..end])?),
                Section::Limit => limit = Some(parse_count(&tokens[start..end])?),
            }
        }

        match (limit, queries.first_mut()) {
            (Some(count), Some(first)) => {
                first.limit(count, skip.unwrap_or(0), self.session);
            }
            (None, _) if skip.is_some() => log::warn!("SKIP without LIMIT is ignored"),
            _ => {}
        }
        log::debug!("cypher: {} queries", queries.len());
        Ok(queries)
    }
}
