//! MongoDB shell calls: `db.T.find(filter, projection).sort(..).limit(n).skip(n)`
//! and `db.T.aggregate([stages])`.
//!
//! Arguments are read into `serde_json` values first (keys may be bare
//! words, strings may use single quotes), then walked into clauses. Each
//! `$lookup` stage adds a query linked to the collection through the
//! session's foreign keys.

use serde_json::{Map, Number, Value};

use crate::expression::Function;
use crate::query_model::{ClauseKind, Query, Session};

use super::lexer::{self, Token, TokenKind};
use super::{ParserError, QueryParser};

/// One `.method(args)` link of the call chain.
#[derive(Debug)]
struct Call {
    method: String,
    args: Vec<Value>,
}

pub struct MongoParser<'s> {
    session: &'s Session,
}

/// Queries under construction for one collection.
struct Collection {
    queries: Vec<Query>,
    count: Option<u32>,
    skip: u32,
}

impl Collection {
    fn main(&mut self) -> &mut Query {
        &mut self.queries[0]
    }

    /// Qualify a document path with the collection alias, unless it already
    /// starts with the alias of a looked-up collection.
    fn field(&self, name: &str) -> String {
        let name = name.trim_start_matches('$');
        if let Some((prefix, _)) = name.split_once('.') {
            if self.queries.iter().any(|q| q.alias() == prefix) {
                return name.to_string();
            }
        }
        format!("{}.{}", self.queries[0].alias(), name)
    }
}

impl<'s> MongoParser<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn read_calls(&self, text: &str, tokens: &[Token<'_>]) -> Result<(String, Vec<Call>), ParserError> {
        let head = tokens
            .first()
            .filter(|t| t.kind == TokenKind::Word)
            .ok_or_else(|| ParserError::UnknownSyntax(text.chars().take(40).collect()))?;
        let mut parts = head.text.splitn(3, '.');
        let (collection, method) = match (parts.next(), parts.next(), parts.next()) {
            (Some("db"), Some(collection), Some(method)) => (collection.to_string(), method.to_string()),
            _ => return Err(ParserError::UnknownSyntax(head.text.to_string())),
        };

        let mut calls = Vec::new();
        let mut method = Some(method);
        let mut i = 1;
        while let Some(name) = method.take() {
            let open = tokens.get(i).filter(|t| t.is("(")).ok_or_else(|| match tokens.get(i) {
                Some(token) => unexpected(token),
                None => ParserError::UnknownSyntax(format!("missing arguments for {}", name)),
            })?;
            let close = lexer::matching_close(tokens, i)?;
            log::trace!("mongo call {} at offset {}", name, open.start);
            calls.push(Call {
                method: name,
                args: read_list(&tokens[i + 1..close])?,
            });
            i = close + 1;
            match tokens.get(i) {
                Some(dot) if dot.is(".") => {
                    let word = tokens
                        .get(i + 1)
                        .filter(|t| t.kind == TokenKind::Word)
                        .ok_or_else(|| unexpected(dot))?;
                    method = Some(word.text.to_string());
                    i += 2;
                }
                Some(end) if end.is(";") && i + 1 == tokens.len() => {}
                Some(token) => return Err(unexpected(token)),
                None => {}
            }
        }
        Ok((collection, calls))
    }

    fn apply_call(&self, call: &Call, target: &mut Collection) -> Result<(), ParserError> {
        match call.method.as_str() {
            "find" | "findOne" => {
                if let Some(filter) = call.args.first() {
                    self.filter(expect_object(filter, "filter")?, target)?;
                }
                if let Some(projection) = call.args.get(1) {
                    self.projection(expect_object(projection, "projection")?, target)?;
                }
                if call.method == "findOne" {
                    target.count = Some(1);
                }
            }
            "sort" => self.sort(expect_object(first_arg(call)?, "sort")?, target)?,
            "limit" => target.count = Some(expect_count(first_arg(call)?)?),
            "skip" => target.skip = expect_count(first_arg(call)?)?,
            "aggregate" => {
                let Value::Array(stages) = first_arg(call)? else {
                    return Err(ParserError::UnknownSyntax("aggregate expects a list of stages".to_string()));
                };
                for stage in stages {
                    self.stage(expect_object(stage, "stage")?, target)?;
                }
            }
            other => return Err(ParserError::UnknownSyntax(format!("unsupported call {}()", other))),
        }
        Ok(())
    }

    fn stage(&self, stage: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        let Some((name, body)) = stage.iter().next().filter(|_| stage.len() == 1) else {
            return Err(ParserError::UnknownSyntax(Value::Object(stage.clone()).to_string()));
        };
        match name.as_str() {
            "$match" => self.filter(expect_object(body, name)?, target),
            "$project" => self.projection(expect_object(body, name)?, target),
            "$sort" => self.sort(expect_object(body, name)?, target),
            "$limit" => {
                target.count = Some(expect_count(body)?);
                Ok(())
            }
            "$skip" => {
                target.skip = expect_count(body)?;
                Ok(())
            }
            "$group" => self.group(expect_object(body, name)?, target),
            "$lookup" => self.lookup(expect_object(body, name)?, target),
            "$unwind" => {
                log::debug!("ignoring $unwind {}", body);
                Ok(())
            }
            other => Err(ParserError::UnknownSyntax(format!("unsupported stage {}", other))),
        }
    }

    fn filter(&self, filter: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        for condition in conditions(filter, target)? {
            target.main().push(ClauseKind::Where, condition);
        }
        Ok(())
    }

    fn projection(&self, projection: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        for (name, shown) in projection {
            let included = match shown {
                Value::Bool(flag) => *flag,
                Value::Number(n) => n.as_i64() != Some(0),
                _ => true,
            };
            if included && name != "_id" {
                let field = target.field(name);
                target.main().push(ClauseKind::Select, field);
            }
        }
        Ok(())
    }

    fn sort(&self, sort: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        for (name, direction) in sort {
            let suffix = if direction.as_i64() == Some(-1) { " DESC" } else { "" };
            let field = format!("{}{}", target.field(name), suffix);
            target.main().push(ClauseKind::OrderBy, field);
        }
        Ok(())
    }

    fn group(&self, group: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        let keys: Vec<String> = match group.get("_id") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(key)) => vec![target.field(key)],
            Some(Value::Object(keys)) => keys
                .values()
                .filter_map(Value::as_str)
                .map(|key| target.field(key))
                .collect(),
            Some(other) => return Err(ParserError::UnknownSyntax(format!("group key {}", other))),
        };
        let session = self.session;
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        target.main().add_fields(&key_refs, false, true, session)?;

        for (name, accumulator) in group.iter().filter(|(name, _)| *name != "_id") {
            let spec = expect_object(accumulator, name)?;
            let Some((operator, argument)) = spec.iter().next() else {
                return Err(ParserError::UnknownSyntax(format!("empty accumulator {}", name)));
            };
            let function = operator.trim_start_matches('$');
            let (function, field) = match argument {
                Value::Number(n) if function == "sum" && n.as_i64() == Some(1) => ("count", "*".to_string()),
                Value::String(path) => (function, target.field(path)),
                other => return Err(ParserError::UnknownSyntax(format!("{}: {}", operator, other))),
            };
            let modifier = Function::from_name(function)?.named(name);
            target.main().apply(&field, &modifier, session)?;
        }
        Ok(())
    }

    fn lookup(&self, lookup: &Map<String, Value>, target: &mut Collection) -> Result<(), ParserError> {
        let text = |key: &str| -> Result<&str, ParserError> {
            lookup
                .get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| ParserError::UnknownSyntax(format!("$lookup without {}", key)))
        };
        let (from, local, foreign, alias) = (text("from")?, text("localField")?, text("foreignField")?, text("as")?);

        // `localField` may point into an earlier lookup
        let (child, local) = match local.split_once('.') {
            Some((prefix, field)) => match target.queries.iter().position(|q| q.alias() == prefix) {
                Some(index) => (index, field),
                None => (0, local),
            },
            None => (0, local),
        };
        let child_table = target.queries[child].table_name().to_string();
        self.session
            .register_foreign_key(&child_table, from, local, Some(foreign));
        let mut joined = Query::new(&format!("{} {}", from, alias), self.session);
        joined.set_key_field(foreign);
        target.queries.push(joined);
        Ok(())
    }
}

impl QueryParser for MongoParser<'_> {
    fn evaluate(&self, text: &str, tokens: &[Token<'_>]) -> Result<Vec<Query>, ParserError> {
        let (collection, calls) = self.read_calls(text, tokens)?;
        let mut target = Collection {
            queries: vec![Query::new(&collection, self.session)],
            count: None,
            skip: 0,
        };
        for call in &calls {
            self.apply_call(call, &mut target)?;
        }
        match target.count {
            Some(count) => {
                let skip = target.skip;
                target.main().limit(count, skip, self.session);
            }
            None if target.skip > 0 => log::warn!("skip({}) without limit is ignored", target.skip),
            None => {}
        }
        log::debug!("mongo: {} queries on {}", target.queries.len(), collection);
        Ok(target.queries)
    }
}

fn unexpected(token: &Token<'_>) -> ParserError {
    ParserError::UnexpectedToken {
        token: token.text.to_string(),
        offset: token.start,
    }
}

fn first_arg(call: &Call) -> Result<&Value, ParserError> {
    call.args
        .first()
        .ok_or_else(|| ParserError::UnknownSyntax(format!("{}() needs an argument", call.method)))
}

fn expect_object<'v>(value: &'v Value, context: &str) -> Result<&'v Map<String, Value>, ParserError> {
    value
        .as_object()
        .ok_or_else(|| ParserError::UnknownSyntax(format!("{} must be a document, found {}", context, value)))
}

fn expect_count(value: &Value) -> Result<u32, ParserError> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ParserError::UnknownSyntax(format!("expected a row count, found {}", value)))
}

/// Comma-separated values between brackets.
fn read_list(tokens: &[Token<'_>]) -> Result<Vec<Value>, ParserError> {
    let mut values = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (value, next) = read_value(tokens, i)?;
        values.push(value);
        i = next;
        match tokens.get(i) {
            Some(token) if token.is(",") => i += 1,
            Some(token) => return Err(unexpected(token)),
            None => {}
        }
    }
    Ok(values)
}

/// Read the value starting at `pos`; returns it with the next position.
fn read_value(tokens: &[Token<'_>], pos: usize) -> Result<(Value, usize), ParserError> {
    let token = tokens
        .get(pos)
        .ok_or_else(|| ParserError::UnknownSyntax("missing value".to_string()))?;
    match token.kind {
        TokenKind::Text => Ok((Value::String(unquote_text(token.text)), pos + 1)),
        TokenKind::Number => Ok((number(token.text, false, token)?, pos + 1)),
        TokenKind::Symbol if token.is("-") => match tokens.get(pos + 1) {
            Some(next) if next.kind == TokenKind::Number => Ok((number(next.text, true, next)?, pos + 2)),
            _ => Err(unexpected(token)),
        },
        TokenKind::Symbol if token.is("{") => {
            let close = lexer::matching_close(tokens, pos)?;
            let mut object = Map::new();
            let mut i = pos + 1;
            while i < close {
                let key = &tokens[i];
                let name = match key.kind {
                    TokenKind::Word => key.text.to_string(),
                    TokenKind::Text => unquote_text(key.text),
                    _ => return Err(unexpected(key)),
                };
                if !tokens.get(i + 1).is_some_and(|t| t.is(":")) {
                    return Err(tokens.get(i + 1).map_or_else(|| unexpected(key), unexpected));
                }
                let (value, next) = read_value(&tokens[..close], i + 2)?;
                object.insert(name, value);
                i = next;
                if i < close {
                    if !tokens[i].is(",") {
                        return Err(unexpected(&tokens[i]));
                    }
                    i += 1;
                }
            }
            Ok((Value::Object(object), close + 1))
        }
        TokenKind::Symbol if token.is("[") => {
            let close = lexer::matching_close(tokens, pos)?;
            Ok((Value::Array(read_list(&tokens[pos + 1..close])?), close + 1))
        }
        TokenKind::Word => match token.text {
            "true" => Ok((Value::Bool(true), pos + 1)),
            "false" => Ok((Value::Bool(false), pos + 1)),
            "null" => Ok((Value::Null, pos + 1)),
            // ISODate("..."), ObjectId("...")
            _ if tokens.get(pos + 1).is_some_and(|t| t.is("(")) => {
                let close = lexer::matching_close(tokens, pos + 1)?;
                let mut args = read_list(&tokens[pos + 2..close])?;
                match args.len() {
                    1 => Ok((args.remove(0), close + 1)),
                    _ => Err(unexpected(token)),
                }
            }
            _ => Err(unexpected(token)),
        },
        TokenKind::Symbol => Err(unexpected(token)),
    }
}

fn unquote_text(text: &str) -> String {
    text[1..text.len() - 1].to_string()
}

fn number(text: &str, negative: bool, token: &Token<'_>) -> Result<Value, ParserError> {
    let signed = if negative { format!("-{}", text) } else { text.to_string() };
    if let Ok(int) = signed.parse::<i64>() {
        return Ok(Value::Number(Number::from(int)));
    }
    signed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| unexpected(token))
}

/// JSON scalar as SQL literal text.
fn sql_literal(value: &Value) -> Result<String, ParserError> {
    match value {
        Value::String(text) => Ok(format!("'{}'", text.replace('\'', "''"))),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok("NULL".to_string()),
        other => Err(ParserError::UnknownSyntax(format!("unsupported literal {}", other))),
    }
}

/// `^abc` -> `abc%`, `abc$` -> `%abc`, `abc` -> `%abc%`.
fn regex_to_like(pattern: &str) -> String {
    let anchored_start = pattern.starts_with('^');
    let anchored_end = pattern.ends_with('$');
    let core = pattern.trim_start_matches('^').trim_end_matches('$');
    let core = core.replace(".*", "%").replace('.', "_");
    format!(
        "{}{}{}",
        if anchored_start { "" } else { "%" },
        core,
        if anchored_end { "" } else { "%" }
    )
}

/// WHERE fragments for one filter document, one per top-level key.
fn conditions(filter: &Map<String, Value>, target: &Collection) -> Result<Vec<String>, ParserError> {
    let mut result = Vec::new();
    for (key, value) in filter {
        match key.as_str() {
            "$or" | "$and" => {
                let Value::Array(branches) = value else {
                    return Err(ParserError::UnknownSyntax(format!("{} expects a list", key)));
                };
                let mut parts = Vec::new();
                for branch in branches {
                    let inner = conditions(expect_object(branch, key)?, target)?;
                    parts.push(match inner.len() {
                        1 => inner.into_iter().collect::<String>(),
                        _ => format!("({})", inner.join(" AND ")),
                    });
                }
                if key == "$or" {
                    result.push(format!("({})", parts.join(" OR ")));
                } else {
                    result.extend(parts);
                }
            }
            operator if operator.starts_with('$') => {
                return Err(ParserError::UnknownSyntax(format!("unsupported operator {}", operator)))
            }
            name => result.extend(field_conditions(&target.field(name), value)?),
        }
    }
    Ok(result)
}

fn field_conditions(field: &str, value: &Value) -> Result<Vec<String>, ParserError> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        Value::Null => return Ok(vec![format!("{} IS NULL", field)]),
        other => return Ok(vec![format!("{} = {}", field, sql_literal(other)?)]),
    };
    if operators.len() == 2 {
        if let (Some(low), Some(high)) = (operators.get("$gte"), operators.get("$lte")) {
            return Ok(vec![format!(
                "{} BETWEEN {} AND {}",
                field,
                sql_literal(low)?,
                sql_literal(high)?
            )]);
        }
    }

    let mut result = Vec::new();
    for (operator, operand) in operators {
        let condition = match (operator.as_str(), operand) {
            ("$eq", Value::Null) => format!("{} IS NULL", field),
            ("$ne", Value::Null) => format!("{} IS NOT NULL", field),
            ("$exists", Value::Bool(true)) => format!("{} IS NOT NULL", field),
            ("$exists", Value::Bool(false)) => format!("{} IS NULL", field),
            ("$in" | "$nin", Value::Array(items)) => {
                let items = items.iter().map(sql_literal).collect::<Result<Vec<_>, _>>()?;
                let negation = if operator == "$nin" { "NOT " } else { "" };
                format!("{} {}IN ({})", field, negation, items.join(", "))
            }
            ("$regex", Value::String(pattern)) => format!("{} LIKE '{}'", field, regex_to_like(pattern)),
            (op, operand) => {
                let symbol = match op {
                    "$eq" => "=",
                    "$ne" => "<>",
                    "$gt" => ">",
                    "$gte" => ">=",
                    "$lt" => "<",
                    "$lte" => "<=",
                    _ => return Err(ParserError::UnknownSyntax(format!("unsupported operator {}", op))),
                };
                format!("{} {} {}", field, symbol, sql_literal(operand)?)
            }
        };
        result.push(condition);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::generator::Language;
    use crate::parser::merge_all;

    fn parse(text: &str, session: &Session) -> Vec<Query> {
        MongoParser::new(session).parse(text).unwrap()
    }

    #[test]
    fn test_find_chain() {
        let session = Session::default();
        let queries = parse(
            r#"db.Product.find({price: {$gt: 10}, 'category': "Gizmo"}, {name: 1, _id: 0}).sort({price: -1}).limit(5).skip(10)"#,
            &session,
        );
        let query = &queries[0];
        assert_eq!(query.alias(), "pro");
        assert_eq!(
            query.values(ClauseKind::Where),
            ["pro.price > 10", "pro.category = 'Gizmo'"]
        );
        assert_eq!(query.values(ClauseKind::Select), ["pro.name"]);
        assert_eq!(query.values(ClauseKind::OrderBy), ["pro.price DESC"]);
        assert_eq!(query.values(ClauseKind::Limit), ["5 OFFSET 10"]);
    }

    #[test]
    fn test_operators() {
        let session = Session::default();
        let queries = parse(
            r#"db.Product.find({"price":{"$gte":10,"$lte":20},"category":{"$in":["a","b"]},"$or":[{"vendor":"x"},{"vendor":"y"}],"name":{"$regex":"^Gi"},"deleted":null})"#,
            &session,
        );
        assert_eq!(
            queries[0].values(ClauseKind::Where),
            [
                "pro.price BETWEEN 10 AND 20",
                "pro.category IN ('a', 'b')",
                "(pro.vendor = 'x' OR pro.vendor = 'y')",
                "pro.name LIKE 'Gi%'",
                "pro.deleted IS NULL"
            ]
        );
    }

    #[test]
    fn test_group_stage() {
        let session = Session::default();
        let queries = parse(
            r#"db.Sales.aggregate([{"$match":{"year":2024}},{"$group":{"_id":"$region","total":{"$sum":"$value"},"orders":{"$sum":1}}}])"#,
            &session,
        );
        let query = &queries[0];
        assert_eq!(query.values(ClauseKind::Where), ["sal.year = 2024"]);
        assert_eq!(query.values(ClauseKind::GroupBy), ["sal.region"]);
        assert_eq!(
            query.values(ClauseKind::Select),
            ["sal.region", "SUM(sal.value) as total", "COUNT(*) as orders"]
        );
    }

    #[test]
    fn test_lookup_registers_foreign_key() {
        let session = Session::default();
        let queries = parse(
            r#"db.Product.aggregate([{"$lookup":{"from":"Vendor","localField":"vendor_id","foreignField":"id","as":"v"}},{"$unwind":"$v"},{"$match":{"v.country":"BR"}},{"$project":{"name":1}}])"#,
            &session,
        );
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].alias(), "v");
        let merged = merge_all(queries, &session).unwrap();
        assert_eq!(
            merged.values(ClauseKind::From),
            ["Product pro", "JOIN Vendor v ON (pro.vendor_id = v.id)"]
        );
        assert_eq!(merged.values(ClauseKind::Where), ["v.country = 'BR'"]);
        assert_eq!(merged.values(ClauseKind::Select), ["pro.name"]);
    }

    #[test]
    fn test_unknown_stage() {
        let session = Session::default();
        let result = MongoParser::new(&session).parse(r#"db.Product.aggregate([{"$facet": {}}])"#);
        assert_eq!(
            result.err(),
            Some(ParserError::UnknownSyntax("unsupported stage $facet".to_string()))
        );
    }

    #[test]
    fn test_unbalanced() {
        let session = Session::default();
        let result = MongoParser::new(&session).parse(r#"db.Product.find({"price": {"$gt": 10})"#);
        assert!(matches!(result, Err(ParserError::UnbalancedBrackets(_))));
    }

    #[test]
    fn test_round_trip() {
        let session = Session::new(SessionConfig {
            break_lines: false,
            ..Default::default()
        });
        session.register_foreign_key("Product", "Vendor", "vendor_id", Some("id"));
        let mut product = Query::new("Product p", &session);
        product.push(ClauseKind::Select, "p.name");
        product.push(ClauseKind::Where, "p.price >= 10");
        product.push(ClauseKind::OrderBy, "p.name");
        product.limit(20, 0, &session);
        let mut vendor = Query::new("Vendor v", &session);
        vendor.push(ClauseKind::Where, "v.country = 'BR'");
        let original = product.merge(&vendor, &session).unwrap();

        let text = original.translate_to(Language::MongoDb, &session).unwrap();
        let parsed = merge_all(parse(&text, &session), &session).unwrap();
        assert_eq!(parsed, original);
    }
}
