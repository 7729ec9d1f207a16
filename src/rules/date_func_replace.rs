use std::sync::LazyLock;

use regex::Regex;

use crate::expression::Where;
use crate::query_model::{ClauseKind, Query, Session};

use super::{Rule, RuleResult};

static YEAR_EQUALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^YEAR\s*\(\s*([\w.]+)\s*\)\s*=\s*'?(\d{4})'?$").unwrap()
});

/// `YEAR(f) = Y` becomes `f BETWEEN 'Y-01-01' AND 'Y-12-31'`, which can use
/// an index on `f`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFuncReplace;

impl Rule for DateFuncReplace {
    fn name(&self) -> &'static str {
        "DateFuncReplace"
    }

    fn apply(&self, query: &mut Query, _session: &Session) -> RuleResult<()> {
        let mut rewritten = query.values(ClauseKind::Where).to_vec();
        for condition in rewritten.iter_mut() {
            let Some(captures) = YEAR_EQUALS.captures(condition.trim()) else {
                continue;
            };
            let year = &captures[2];
            let range = Where::between(format!("{}-01-01", year), format!("{}-12-31", year));
            *condition = range.format(&captures[1], query);
        }
        query.set_values(ClauseKind::Where, rewritten);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Between;
    use crate::parser::{QueryParser, SqlParser};

    #[test]
    fn test_year_becomes_range() {
        let session = Session::default();
        let mut query = SqlParser::new(&session)
            .parse("SELECT * FROM Product p WHERE YEAR(last_sale) = 2024")
            .unwrap()
            .remove(0);
        DateFuncReplace.apply(&mut query, &session).unwrap();
        let expected = Query::new("Product p", &session)
            .with("last_sale", Between::new("2024-01-01", "2024-12-31"), &session)
            .unwrap();
        assert_eq!(query, expected);
        assert_eq!(
            query.values(ClauseKind::Where),
            ["p.last_sale BETWEEN '2024-01-01' AND '2024-12-31'"]
        );
    }

    #[test]
    fn test_other_functions_are_kept() {
        let session = Session::default();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::Where, "MONTH(p.last_sale) = 12");
        DateFuncReplace.apply(&mut query, &session).unwrap();
        assert_eq!(query.values(ClauseKind::Where), ["MONTH(p.last_sale) = 12"]);
    }
}
