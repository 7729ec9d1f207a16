//! MongoDB shell calls: `db.T.find(filter, projection)` or, when grouping or
//! joining, `db.T.aggregate([...])`.

use serde_json::{json, Map, Value};

use crate::query_model::{
    is_quoted, parse_condition, strip_alias_prefixes, unquote, ClauseKind, CompareOp, Condition,
    JoinFragment, Query, Session, SortType,
};

use super::{split_aggregates, split_alias, Aggregate, GeneratorError, Renderer};

pub struct MongoRenderer<'a> {
    query: &'a Query,
    filter: Map<String, Value>,
    projection: Map<String, Value>,
    group: Option<Map<String, Value>>,
    sort: Map<String, Value>,
    limit: Option<(u64, u64)>,
}

impl<'a> MongoRenderer<'a> {
    pub fn new(query: &'a Query, _session: &'a Session) -> Self {
        Self {
            query,
            filter: Map::new(),
            projection: Map::new(),
            group: None,
            sort: Map::new(),
            limit: None,
        }
    }

    /// Field name without the query's own alias; joined aliases stay as the
    /// `$lookup` output prefix.
    fn field_name(&self, field: &str) -> String {
        strip_alias_prefixes(field.trim(), Some(self.query.alias()))
    }

    fn literal(&self, text: &str, condition: &str) -> Result<Value, GeneratorError> {
        json_literal(text).ok_or_else(|| self.unsupported(condition))
    }

    fn add_condition(
        &self,
        target: &mut Map<String, Value>,
        condition: &Condition,
        source: &str,
    ) -> Result<(), GeneratorError> {
        match condition {
            Condition::Compare { field, op, value } => {
                let value = self.literal(value, source)?;
                let field = self.field_name(field);
                if *op == CompareOp::Eq && !target.contains_key(&field) {
                    target.insert(field, value);
                } else {
                    insert_operator(target, field, mongo_operator(*op), value);
                }
            }
            Condition::In {
                field,
                values,
                negated,
            } => {
                let values = values
                    .iter()
                    .map(|v| self.literal(v, source))
                    .collect::<Result<Vec<_>, _>>()?;
                let operator = if *negated { "$nin" } else { "$in" };
                insert_operator(target, self.field_name(field), operator, Value::Array(values));
            }
            Condition::Between { field, low, high } => {
                let field = self.field_name(field);
                insert_operator(target, field.clone(), "$gte", self.literal(low, source)?);
                insert_operator(target, field, "$lte", self.literal(high, source)?);
            }
            Condition::IsNull { field, negated } => {
                let operator = if *negated { "$ne" } else { "$eq" };
                insert_operator(target, self.field_name(field), operator, Value::Null);
            }
            Condition::Like {
                field,
                pattern,
                negated: false,
            } => {
                insert_operator(target, self.field_name(field), "$regex", json!(like_to_regex(pattern)));
            }
            Condition::Or(parts) => {
                let mut branches = Vec::new();
                for part in parts {
                    let mut branch = Map::new();
                    self.add_condition(&mut branch, part, source)?;
                    branches.push(Value::Object(branch));
                }
                if target.contains_key("$or") {
                    let and = target
                        .entry("$and")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = and {
                        items.push(json!({ "$or": branches }));
                    }
                } else {
                    target.insert("$or".to_string(), Value::Array(branches));
                }
            }
            Condition::And(parts) => {
                for part in parts {
                    self.add_condition(target, part, source)?;
                }
            }
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Compare { field, op, value } => {
                    let inverted = Condition::Compare {
                        field: field.clone(),
                        op: op.inverse(),
                        value: value.clone(),
                    };
                    self.add_condition(target, &inverted, source)?;
                }
                _ => return Err(self.unsupported(source)),
            },
            Condition::Like { negated: true, .. } => return Err(self.unsupported(source)),
        }
        Ok(())
    }

    fn lookups(&self) -> Result<Vec<Value>, GeneratorError> {
        let mut stages = Vec::new();
        for source in self.query.values(ClauseKind::From).iter().skip(1) {
            let join = JoinFragment::parse(source).ok_or_else(|| self.unsupported(source))?;
            let ((left_alias, left_field), (right_alias, right_field)) =
                join.key_pair().ok_or_else(|| self.unsupported(source))?;
            let (local, foreign) = if right_alias == join.alias {
                (format!("{}.{}", left_alias, left_field), right_field)
            } else {
                (format!("{}.{}", right_alias, right_field), left_field)
            };
            stages.push(json!({
                "$lookup": {
                    "from": join.table,
                    "localField": self.field_name(&local),
                    "foreignField": foreign,
                    "as": join.alias,
                }
            }));
            stages.push(json!({ "$unwind": format!("${}", join.alias) }));
        }
        Ok(stages)
    }

    fn group_stage(&self, keys: &[String], aggregates: &[Aggregate]) -> Map<String, Value> {
        let id = match keys {
            [] => Value::Null,
            [key] => json!(format!("${}", key)),
            _ => Value::Object(
                keys.iter()
                    .map(|k| (k.clone(), json!(format!("${}", k))))
                    .collect(),
            ),
        };
        let mut group = Map::new();
        group.insert("_id".to_string(), id);
        for aggregate in aggregates {
            let accumulator = if aggregate.function == "count" {
                json!({ "$sum": 1 })
            } else {
                let mut inner = Map::new();
                inner.insert(
                    format!("${}", aggregate.function),
                    json!(format!("${}", self.field_name(&aggregate.argument))),
                );
                Value::Object(inner)
            };
            group.insert(aggregate.output_name(), accumulator);
        }
        if aggregates.is_empty() {
            group.insert("count".to_string(), json!({ "$sum": 1 }));
        }
        group
    }
}

impl Renderer for MongoRenderer<'_> {
    fn language(&self) -> &'static str {
        "mongodb"
    }

    fn query(&self) -> &Query {
        self.query
    }

    fn keywords(&self) -> &'static [ClauseKind] {
        &[
            ClauseKind::Where,
            ClauseKind::GroupBy,
            ClauseKind::Select,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
        ]
    }

    fn has_default(&self, _kind: ClauseKind) -> bool {
        false
    }

    fn format_clause(&mut self, kind: ClauseKind, values: &[String]) -> Result<String, GeneratorError> {
        match kind {
            ClauseKind::Where => {
                let mut filter = Map::new();
                for text in values {
                    let condition = parse_condition(text).ok_or_else(|| self.unsupported(text))?;
                    self.add_condition(&mut filter, &condition, text)?;
                }
                self.filter = filter;
            }
            ClauseKind::GroupBy => {
                let keys: Vec<String> = values.iter().map(|v| self.field_name(v)).collect();
                let (aggregates, _) = split_aggregates(self.query.values(ClauseKind::Select));
                self.group = Some(self.group_stage(&keys, &aggregates));
            }
            ClauseKind::Select => {
                let (aggregates, plain) = split_aggregates(values);
                if !aggregates.is_empty() && self.group.is_none() {
                    self.group = Some(self.group_stage(&[], &aggregates));
                }
                for field in plain {
                    let (expr, _) = split_alias(&field);
                    let name = self.field_name(&expr);
                    if name == "*" || name.starts_with("TOP(") {
                        continue;
                    }
                    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                        return Err(GeneratorError::UnsupportedField {
                            language: self.language().to_string(),
                            field: field.clone(),
                        });
                    }
                    if self.group.is_none() {
                        self.projection.insert(name, json!(1));
                    }
                }
            }
            ClauseKind::OrderBy => {
                for value in values {
                    let (field, sort) = SortType::split_fragment(value);
                    let direction = if sort == SortType::Desc { -1 } else { 1 };
                    self.sort.insert(self.field_name(field), json!(direction));
                }
            }
            ClauseKind::Limit => {
                if let Some(text) = values.first() {
                    self.limit = parse_limit(text);
                }
            }
            ClauseKind::From => {}
        }
        Ok(String::new())
    }

    fn assemble(&mut self, _parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError> {
        let collection = self.query.table_name();
        let lookups = self.lookups()?;

        if self.group.is_none() && lookups.is_empty() {
            let mut text = format!("db.{}.find({}", collection, Value::Object(self.filter.clone()));
            if !self.projection.is_empty() {
                text.push_str(&format!(", {}", Value::Object(self.projection.clone())));
            }
            text.push(')');
            if !self.sort.is_empty() {
                text.push_str(&format!(".sort({})", Value::Object(self.sort.clone())));
            }
            if let Some((count, offset)) = self.limit {
                text.push_str(&format!(".limit({})", count));
                if offset > 0 {
                    text.push_str(&format!(".skip({})", offset));
                }
            }
            return Ok(text);
        }

        let mut stages = lookups;
        if !self.filter.is_empty() {
            stages.push(json!({ "$match": Value::Object(self.filter.clone()) }));
        }
        match &self.group {
            Some(group) => stages.push(json!({ "$group": Value::Object(group.clone()) })),
            None if !self.projection.is_empty() => {
                stages.push(json!({ "$project": Value::Object(self.projection.clone()) }))
            }
            None => {}
        }
        if !self.sort.is_empty() {
            stages.push(json!({ "$sort": Value::Object(self.sort.clone()) }));
        }
        if let Some((count, offset)) = self.limit {
            if offset > 0 {
                stages.push(json!({ "$skip": offset }));
            }
            stages.push(json!({ "$limit": count }));
        }
        Ok(format!("db.{}.aggregate({})", collection, Value::Array(stages)))
    }
}

fn mongo_operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "$eq",
        CompareOp::Ne => "$ne",
        CompareOp::Gt => "$gt",
        CompareOp::Gte => "$gte",
        CompareOp::Lt => "$lt",
        CompareOp::Lte => "$lte",
    }
}

/// Add `{operator: value}` under `field`, turning a bare equality already
/// stored there into `$eq`.
fn insert_operator(target: &mut Map<String, Value>, field: String, operator: &str, value: Value) {
    let entry = target.entry(field).or_insert_with(|| Value::Object(Map::new()));
    if !matches!(entry, Value::Object(map) if map.keys().all(|k| k.starts_with('$'))) {
        let previous = entry.take();
        *entry = json!({ "$eq": previous });
    }
    if let Value::Object(map) = entry {
        map.insert(operator.to_string(), value);
    }
}

/// SQL literal text to JSON: quoted text, integers, floats, booleans, NULL.
pub(crate) fn json_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if is_quoted(text) {
        return Some(json!(unquote(text)));
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(json!(int));
    }
    if let Ok(float) = text.parse::<f64>() {
        return serde_json::Number::from_f64(float).map(Value::Number);
    }
    match text.to_lowercase().as_str() {
        "true" => Some(json!(true)),
        "false" => Some(json!(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

/// `%abc%` -> `abc`, `abc%` -> `^abc`, `%abc` -> `abc$`.
fn like_to_regex(pattern: &str) -> String {
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%') && pattern.len() > 1;
    let core = pattern.trim_matches('%').replace('%', ".*").replace('_', ".");
    match (starts, ends) {
        (true, true) => core,
        (false, true) => format!("^{}", core),
        (true, false) => format!("{}$", core),
        (false, false) => format!("^{}$", core),
    }
}

/// `"10"` or `"10 OFFSET 20"`.
pub(crate) fn parse_limit(text: &str) -> Option<(u64, u64)> {
    let mut words = text.split_whitespace();
    let count = words.next()?.parse().ok()?;
    let offset = match (words.next(), words.next()) {
        (Some(keyword), Some(offset)) if keyword.eq_ignore_ascii_case("OFFSET") => {
            offset.parse().ok()?
        }
        _ => 0,
    };
    Some((count, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn session() -> Session {
        Session::new(SessionConfig {
            break_lines: false,
            ..Default::default()
        })
    }

    fn render(query: &Query, session: &Session) -> Result<String, GeneratorError> {
        MongoRenderer::new(query, session).convert()
    }

    #[test]
    fn test_find_with_projection_sort_and_limit() {
        let session = session();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Select, "p.name");
        query.push(ClauseKind::Select, "p.price");
        query.push(ClauseKind::Where, "p.price > 10");
        query.push(ClauseKind::Where, "p.category = 'Gizmo'");
        query.push(ClauseKind::OrderBy, "p.price DESC");
        query.limit(5, 10, &session);
        assert_eq!(
            render(&query, &session).unwrap(),
            r#"db.Product.find({"price":{"$gt":10},"category":"Gizmo"}, {"name":1,"price":1}).sort({"price":-1}).limit(5).skip(10)"#
        );
    }

    #[test]
    fn test_operators() {
        let session = session();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Where, "p.price BETWEEN 10 AND 20");
        query.push(ClauseKind::Where, "p.category IN ('a', 'b')");
        query.push(ClauseKind::Where, "(p.vendor = 'x' OR p.vendor = 'y')");
        query.push(ClauseKind::Where, "p.name LIKE 'Gi%'");
        assert_eq!(
            render(&query, &session).unwrap(),
            r#"db.Product.find({"price":{"$gte":10,"$lte":20},"category":{"$in":["a","b"]},"$or":[{"vendor":"x"},{"vendor":"y"}],"name":{"$regex":"^Gi"}})"#
        );
    }

    #[test]
    fn test_group_by_becomes_aggregate() {
        let session = session();
        let mut query = Query::new("Sales s", &session);
        query.push(ClauseKind::Select, "s.region");
        query.push(ClauseKind::Select, "SUM(s.value) as total");
        query.push(ClauseKind::Where, "s.year = 2024");
        query.push(ClauseKind::GroupBy, "s.region");
        assert_eq!(
            render(&query, &session).unwrap(),
            r#"db.Sales.aggregate([{"$match":{"year":2024}},{"$group":{"_id":"$region","total":{"$sum":"$value"}}}])"#
        );
    }

    #[test]
    fn test_field_comparison_is_unsupported() {
        let session = session();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Where, "p.price > p.cost");
        assert!(matches!(
            render(&query, &session),
            Err(GeneratorError::UnsupportedCondition { .. })
        ));
    }

    #[test]
    fn test_limit_text() {
        assert_eq!(parse_limit("10"), Some((10, 0)));
        assert_eq!(parse_limit("10 OFFSET 5"), Some((10, 5)));
        assert_eq!(parse_limit("ten"), None);
    }
}
