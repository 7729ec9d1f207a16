//! Cypher `MATCH ... WHERE ... RETURN` text.
//!
//! The query table is the core node. Joined tables become neighbours, with
//! the arrow pointing from the side holding the foreign field to the side
//! holding the key. Literal equalities move into node property maps.

use crate::query_model::{
    is_quoted, parse_condition, ClauseKind, CompareOp, Condition, JoinFragment, JoinType, Query,
    Session,
};

use super::mongo::parse_limit;
use super::{GeneratorError, Renderer};

#[derive(Debug, Clone)]
struct Node {
    alias: String,
    label: String,
    properties: Vec<(String, String)>,
}

impl Node {
    fn render(&self) -> String {
        let mut text = format!("({}:{}", self.alias, self.label);
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect();
            text.push_str(&format!("{{{}}}", props.join(", ")));
        }
        text.push(')');
        text
    }
}

/// A neighbour of the core node and the direction of its edge.
#[derive(Debug, Clone)]
struct Edge {
    node: usize,
    /// Core holds the foreign field.
    core_is_child: bool,
}

pub struct Neo4jRenderer<'a> {
    query: &'a Query,
    break_lines: bool,
    nodes: Vec<Node>,
    left: Option<Edge>,
    right: Option<Edge>,
    extra: Vec<Edge>,
    conditions: Vec<String>,
    returns: Vec<String>,
    order: Vec<String>,
    limit: Option<(u64, u64)>,
}

impl<'a> Neo4jRenderer<'a> {
    pub fn new(query: &'a Query, session: &'a Session) -> Self {
        Self {
            query,
            break_lines: session.config().break_lines,
            nodes: Vec::new(),
            left: None,
            right: None,
            extra: Vec::new(),
            conditions: Vec::new(),
            returns: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    fn node_index(&self, alias: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.alias.eq_ignore_ascii_case(alias))
    }

    fn add_join(&mut self, source: &str) -> Result<(), GeneratorError> {
        let join = JoinFragment::parse(source).ok_or_else(|| self.unsupported(source))?;
        let ((child, _), (parent, _)) = join.key_pair().ok_or_else(|| self.unsupported(source))?;
        let core = self.query.alias();
        let core_is_child = child.eq_ignore_ascii_case(core) || !parent.eq_ignore_ascii_case(core);

        self.nodes.push(Node {
            alias: join.alias.clone(),
            label: join.table.clone(),
            properties: Vec::new(),
        });
        let edge = Edge {
            node: self.nodes.len() - 1,
            core_is_child,
        };
        let side = match join.join_type {
            JoinType::Left => Some(&mut self.left).filter(|side| side.is_none()),
            JoinType::Right => Some(&mut self.right).filter(|side| side.is_none()),
            JoinType::Inner | JoinType::Full => {
                if self.right.is_none() {
                    Some(&mut self.right)
                } else if self.left.is_none() {
                    Some(&mut self.left)
                } else {
                    None
                }
            }
        };
        match side {
            Some(side) => *side = Some(edge),
            None => self.extra.push(edge),
        }
        Ok(())
    }

    /// Move `alias.field = literal` into the node's property map.
    fn as_property(&mut self, condition: &Condition) -> bool {
        let Condition::Compare {
            field,
            op: CompareOp::Eq,
            value,
        } = condition
        else {
            return false;
        };
        if !is_literal(value) {
            return false;
        }
        let Some((alias, name)) = field.split_once('.') else {
            return false;
        };
        match self.node_index(alias) {
            Some(index) => {
                self.nodes[index]
                    .properties
                    .push((name.to_string(), value.clone()));
                true
            }
            None => false,
        }
    }

    fn pattern(&self) -> String {
        let core = &self.nodes[0];
        let mut text = String::new();
        if let Some(edge) = &self.left {
            text.push_str(&self.nodes[edge.node].render());
            text.push_str(if edge.core_is_child { "<--" } else { "-->" });
        }
        text.push_str(&core.render());
        if let Some(edge) = &self.right {
            text.push_str(if edge.core_is_child { "-->" } else { "<--" });
            text.push_str(&self.nodes[edge.node].render());
        }
        for edge in &self.extra {
            let arrow = if edge.core_is_child { "-->" } else { "<--" };
            text.push_str(&format!(
                ", ({}){}{}",
                core.alias,
                arrow,
                self.nodes[edge.node].render()
            ));
        }
        text
    }
}

impl Renderer for Neo4jRenderer<'_> {
    fn language(&self) -> &'static str {
        "neo4j"
    }

    fn query(&self) -> &Query {
        self.query
    }

    fn keywords(&self) -> &'static [ClauseKind] {
        &[
            ClauseKind::From,
            ClauseKind::Where,
            ClauseKind::Select,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
        ]
    }

    fn has_default(&self, kind: ClauseKind) -> bool {
        matches!(kind, ClauseKind::From | ClauseKind::Select)
    }

    fn format_clause(&mut self, kind: ClauseKind, values: &[String]) -> Result<String, GeneratorError> {
        match kind {
            ClauseKind::From => {
                self.nodes.push(Node {
                    alias: self.query.alias().to_string(),
                    label: self.query.table_name().to_string(),
                    properties: Vec::new(),
                });
                for source in values.iter().skip(1) {
                    self.add_join(source)?;
                }
            }
            ClauseKind::Where => {
                for text in values {
                    let condition = parse_condition(text).ok_or_else(|| self.unsupported(text))?;
                    if self.as_property(&condition) {
                        continue;
                    }
                    let cypher =
                        cypher_condition(&condition).ok_or_else(|| self.unsupported(text))?;
                    self.conditions.push(cypher);
                }
            }
            ClauseKind::Select => {
                self.returns = values
                    .iter()
                    .filter(|field| field.trim() != "*")
                    .cloned()
                    .collect();
                if self.returns.is_empty() {
                    self.returns = self.nodes.iter().map(|node| node.alias.clone()).collect();
                }
            }
            ClauseKind::OrderBy => self.order = values.to_vec(),
            ClauseKind::Limit => {
                self.limit = values.first().and_then(|text| parse_limit(text));
            }
            // Cypher groups implicitly by the non-aggregate RETURN items
            ClauseKind::GroupBy => {}
        }
        Ok(String::new())
    }

    fn assemble(&mut self, _parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError> {
        let gap = if self.break_lines { "\n" } else { " " };
        let mut text = format!("MATCH {}", self.pattern());
        if !self.conditions.is_empty() {
            text.push_str(&format!("{}WHERE {}", gap, self.conditions.join(" AND ")));
        }
        text.push_str(&format!("{}RETURN {}", gap, self.returns.join(", ")));
        if !self.order.is_empty() {
            text.push_str(&format!("{}ORDER BY {}", gap, self.order.join(", ")));
        }
        if let Some((count, offset)) = self.limit {
            if offset > 0 {
                text.push_str(&format!(" SKIP {}", offset));
            }
            text.push_str(&format!(" LIMIT {}", count));
        }
        Ok(text)
    }
}

fn is_literal(value: &str) -> bool {
    is_quoted(value) || value.trim().parse::<f64>().is_ok()
}

/// Cypher spelling of a parsed condition.
fn cypher_condition(condition: &Condition) -> Option<String> {
    let text = match condition {
        Condition::Compare { field, op, value } => format!("{} {} {}", field, op, value),
        Condition::In {
            field,
            values,
            negated,
        } => {
            let list = format!("{} IN [{}]", field, values.join(", "));
            if *negated {
                format!("NOT {}", list)
            } else {
                list
            }
        }
        Condition::Between { field, low, high } => {
            format!("{} >= {} AND {} <= {}", field, low, field, high)
        }
        Condition::IsNull { field, negated } => {
            format!("{} IS {}NULL", field, if *negated { "NOT " } else { "" })
        }
        Condition::Like {
            field,
            pattern,
            negated,
        } => {
            let core = pattern.trim_matches('%');
            if core.contains(['%', '_']) {
                return None;
            }
            let operator = match (pattern.starts_with('%'), pattern.ends_with('%')) {
                (true, true) => "CONTAINS",
                (false, true) => "STARTS WITH",
                (true, false) => "ENDS WITH",
                (false, false) => "=",
            };
            let text = format!("{} {} '{}'", field, operator, core);
            if *negated {
                format!("NOT {}", text)
            } else {
                text
            }
        }
        Condition::Or(parts) => {
            let parts = parts
                .iter()
                .map(cypher_condition)
                .collect::<Option<Vec<_>>>()?;
            format!("({})", parts.join(" OR "))
        }
        Condition::And(parts) => {
            let parts = parts
                .iter()
                .map(cypher_condition)
                .collect::<Option<Vec<_>>>()?;
            format!("({})", parts.join(" AND "))
        }
        Condition::Not(inner) => format!("NOT {}", cypher_condition(inner)?),
    };
    Some(text)
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
        Neo4jRenderer::new(query, session).convert()
    }

    #[test]
    fn test_single_node() {
        let session = session();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Select, "p.name");
        query.push(ClauseKind::Where, "p.category = 'Gizmo'");
        query.push(ClauseKind::Where, "p.price > 10");
        query.push(ClauseKind::OrderBy, "p.price DESC");
        query.limit(3, 0, &session);
        assert_eq!(
            render(&query, &session).unwrap(),
            "MATCH (p:Product{category:'Gizmo'}) WHERE p.price > 10 RETURN p.name ORDER BY p.price DESC LIMIT 3"
        );
    }

    #[test]
    fn test_joined_nodes() {
        let session = session();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::From, "JOIN Vendor v ON (p.vendor_id = v.id)");
        query.push(ClauseKind::From, "LEFT JOIN Category c ON (p.category_id = c.id)");
        query.push(ClauseKind::Where, "v.country = 'BR'");
        assert_eq!(
            render(&query, &session).unwrap(),
            "MATCH (c:Category)<--(p:Product)-->(v:Vendor{country:'BR'}) RETURN p, v, c"
        );
    }

    #[test]
    fn test_conditions() {
        assert_eq!(
            cypher_condition(&parse_condition("p.category IN ('a', 'b')").unwrap()).unwrap(),
            "p.category IN ['a', 'b']"
        );
        assert_eq!(
            cypher_condition(&parse_condition("p.name LIKE 'Gi%'").unwrap()).unwrap(),
            "p.name STARTS WITH 'Gi'"
        );
        assert_eq!(
            cypher_condition(&parse_condition("p.age BETWEEN 1 AND 5").unwrap()).unwrap(),
            "p.age >= 1 AND p.age <= 5"
        );
    }

    #[test]
    fn test_multi_line_layout() {
        let session = Session::default();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Where, "p.price > 10");
        assert_eq!(
            render(&query, &session).unwrap(),
            "MATCH (p:Product)\nWHERE p.price > 10\nRETURN p"
        );
    }
}
