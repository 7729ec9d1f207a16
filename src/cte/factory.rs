//! `SELECT ... FROM (SELECT ...) AS a JOIN (SELECT ... UNION ALL SELECT ...) AS b ON ...`
//! split into one CTE per aliased sub-select plus a main query over the aliases.

use crate::parser::lexer::{self, Token, TokenKind};
use crate::parser::{merge_all, ParserError, QueryParser, SqlParser};
use crate::query_model::{Query, Session};

use super::{resolve_positions, Cte, CteError};

#[derive(Debug, Clone)]
pub struct CteFactory {
    ctes: Vec<Cte>,
    main: Query,
}

/// An aliased sub-select found in the statement.
struct Extracted {
    alias: String,
    body: String,
    /// Byte span of `( ... ) [AS] alias` in the statement
    span: (usize, usize),
}

fn find_subselects(text: &str, tokens: &[Token<'_>]) -> Result<Vec<Extracted>, ParserError> {
    let mut found = Vec::new();
    let mut skip_until = 0;
    for i in lexer::top_level(tokens) {
        if i < skip_until || !tokens[i].is("(") {
            continue;
        }
        if !tokens.get(i + 1).is_some_and(|t| t.is_keyword("SELECT")) {
            continue;
        }
        let close = lexer::matching_close(tokens, i)?;
        let mut next = close + 1;
        if tokens.get(next).is_some_and(|t| t.is_keyword("AS")) {
            next += 1;
        }
        let alias = tokens
            .get(next)
            .filter(|t| t.kind == TokenKind::Word)
            .ok_or_else(|| ParserError::UnknownSyntax(format!("sub-select at offset {} has no alias", tokens[i].start)))?;
        found.push(Extracted {
            alias: alias.text.to_string(),
            body: text[tokens[i].end()..tokens[close].start].trim().to_string(),
            span: (tokens[i].start, alias.end()),
        });
        skip_until = next + 1;
    }
    Ok(found)
}

/// Split a sub-select body on its top-level `UNION [ALL]` keywords.
fn split_union(body: &str) -> Result<Vec<String>, ParserError> {
    let tokens = lexer::tokenize(body)?;
    let mut branches = Vec::new();
    let mut start = 0;
    let top = lexer::top_level(&tokens);
    let mut n = 0;
    while n < top.len() {
        let token = &tokens[top[n]];
        if token.is_keyword("UNION") {
            branches.push(body[start..token.start].trim().to_string());
            let mut end = token.end();
            if let Some(all) = top.get(n + 1).map(|&j| &tokens[j]).filter(|t| t.is_keyword("ALL")) {
                end = all.end();
                n += 1;
            }
            start = end;
        }
        n += 1;
    }
    branches.push(body[start..].trim().to_string());
    Ok(branches.into_iter().filter(|b| !b.is_empty()).collect())
}

fn parse_single(text: &str, session: &Session) -> Result<Query, ParserError> {
    merge_all(SqlParser::new(session).parse(text)?, session)
}

impl CteFactory {
    pub fn new(text: &str, session: &Session) -> Result<Self, CteError> {
        let tokens = lexer::tokenize(text)?;
        lexer::check_balance(&tokens)?;
        let extracted = find_subselects(text, &tokens)?;

        let mut ctes = Vec::with_capacity(extracted.len());
        let mut rewritten = String::with_capacity(text.len());
        let mut last = 0;
        for sub in &extracted {
            let queries = split_union(&sub.body)?
                .iter()
                .map(|branch| parse_single(branch, session))
                .collect::<Result<Vec<_>, _>>()?;
            log::debug!("CTE {} with {} branch(es)", sub.alias, queries.len());
            ctes.push(Cte::new(&format!("{} {}", sub.alias, sub.alias), queries, session));

            rewritten.push_str(&text[last..sub.span.0]);
            rewritten.push_str(&format!("{} {}", sub.alias, sub.alias));
            last = sub.span.1;
        }
        rewritten.push_str(&text[last..]);

        let main = parse_single(&rewritten, session)?;
        Ok(Self { ctes, main })
    }

    pub fn ctes(&self) -> &[Cte] {
        &self.ctes
    }

    pub fn main(&self) -> &Query {
        &self.main
    }

    pub fn render(&self, session: &Session) -> String {
        let break_lines = session.config().break_lines;
        let definitions: Vec<String> = self.ctes.iter().map(|cte| cte.definition(session)).collect();
        let (between, before_main) = if break_lines { (",\n", "\n") } else { (", ", " ") };
        if definitions.is_empty() {
            return self.main.to_sql(session);
        }
        format!(
            "WITH {}{}{}",
            definitions.join(between),
            before_main,
            self.main.to_sql(session)
        )
    }

    /// Fill `template` once per CTE: `#table` is the CTE name, `**` its
    /// field list and `[n]` its n-th field.
    ///
    /// `"SELECT COUNT(*) FROM #table"` gives one count query per CTE.
    pub fn expand(&self, template: &str) -> Result<Vec<String>, CteError> {
        self.ctes
            .iter()
            .map(|cte| {
                let fields = cte.field_names();
                let text = template
                    .replace("#table", cte.name())
                    .replace("**", &fields.join(", "));
                resolve_positions(&text, &fields)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::query_model::ClauseKind;

    const STATEMENT: &str = "
        SELECT u001.name, agg_sales.total
        FROM (
            SELECT u.name, u.role, u.id FROM Users u WHERE u.role = 'employee'
            UNION ALL
            SELECT u.name, u.role, u.id FROM Users u WHERE u.role = 'customer'
        ) AS u001
        JOIN (
            SELECT s.user_id, Sum(s.value) as total FROM Sales s
            WHERE s.ref_date = '2024-12-27' GROUP BY s.user_id
        )
        As agg_sales
        ON u001.id = agg_sales.user_id
        ORDER BY u001.name";

    fn single_line() -> Session {
        Session::new(SessionConfig {
            break_lines: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_extracts_each_subselect() {
        let session = single_line();
        let factory = CteFactory::new(STATEMENT, &session).unwrap();
        let names: Vec<&str> = factory.ctes().iter().map(Cte::name).collect();
        assert_eq!(names, ["u001", "agg_sales"]);
        assert_eq!(factory.ctes()[0].queries().len(), 2);
        assert_eq!(factory.ctes()[1].queries().len(), 1);
        assert_eq!(
            factory.main().values(ClauseKind::From),
            ["u001 u001", "JOIN agg_sales agg_sales ON (u001.id = agg_sales.user_id)"]
        );
        assert_eq!(factory.main().values(ClauseKind::OrderBy), ["u001.name"]);
    }

    #[test]
    fn test_render() {
        let session = single_line();
        let factory = CteFactory::new(STATEMENT, &session).unwrap();
        let text = factory.render(&session);
        assert!(text.starts_with(
            "WITH u001 AS (SELECT u.name, u.role, u.id FROM Users u WHERE u.role = 'employee' UNION ALL "
        ));
        assert!(text.contains("), agg_sales AS (SELECT s.user_id, Sum(s.value) as total FROM Sales s"));
        assert!(text.ends_with(
            ") SELECT u001.name, agg_sales.total FROM u001 u001 \
             JOIN agg_sales agg_sales ON (u001.id = agg_sales.user_id) ORDER BY u001.name"
        ));
    }

    #[test]
    fn test_expand_templates() {
        let session = single_line();
        let factory = CteFactory::new(STATEMENT, &session).unwrap();
        assert_eq!(
            factory.expand("SELECT [1], ** FROM #table").unwrap(),
            [
                "SELECT name, name, role, id FROM u001",
                "SELECT user_id, user_id, total FROM agg_sales"
            ]
        );
    }

    #[test]
    fn test_missing_alias() {
        let session = single_line();
        let result = CteFactory::new("SELECT * FROM (SELECT a.x FROM A a)", &session);
        assert!(matches!(result, Err(CteError::Parser(ParserError::UnknownSyntax(_)))));
    }
}
