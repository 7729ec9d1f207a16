use crate::query_model::{parse_condition, ClauseKind, Condition, Query, Session};

use super::{Rule, RuleResult};

/// `NOT f <op> value` becomes `f <inverse op> value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalOp;

impl Rule for LogicalOp {
    fn name(&self) -> &'static str {
        "LogicalOp"
    }

    fn apply(&self, query: &mut Query, _session: &Session) -> RuleResult<()> {
        for condition in query.values_mut(ClauseKind::Where) {
            let Some(Condition::Not(inner)) = parse_condition(condition) else {
                continue;
            };
            if let Condition::Compare { field, op, value } = *inner {
                *condition = format!("{} {} {}", field, op.inverse(), value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Not, Where};
    use test_case::test_case;

    #[test]
    fn test_not_lte_becomes_gt() {
        let session = Session::default();
        let mut query = Query::new("Product p", &session)
            .with("price", Not::lte(387.64), &session)
            .unwrap();
        LogicalOp.apply(&mut query, &session).unwrap();
        let expected = Query::new("Product p", &session)
            .with("price", Where::gt(387.64), &session)
            .unwrap();
        assert_eq!(query, expected);
    }

    #[test_case("NOT p.qty >= 3", "p.qty < 3"; "gte")]
    #[test_case("NOT p.qty < 3", "p.qty >= 3"; "lt")]
    #[test_case("NOT p.qty = 3", "p.qty <> 3"; "eq")]
    #[test_case("NOT p.qty <> 3", "p.qty = 3"; "ne")]
    #[test_case("NOT p.name LIKE 'a%'", "NOT p.name LIKE 'a%'"; "like untouched")]
    fn test_inversions(condition: &str, expected: &str) {
        let session = Session::default();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Where, condition);
        LogicalOp.apply(&mut query, &session).unwrap();
        assert_eq!(query.values(ClauseKind::Where), [expected]);
        LogicalOp.apply(&mut query, &session).unwrap();
        assert_eq!(query.values(ClauseKind::Where), [expected]);
    }
}
