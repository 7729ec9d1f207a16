//! Query rewrite rules.
//!
//! A rule rewrites the clauses of one [`Query`] in place. [`optimize`]
//! applies a list of rules in order, each exactly once; [`default_rules`]
//! is the list used by [`Query::optimize`] when the caller gives none.

use crate::query_model::{Query, Session};

mod auto_field;
mod date_func_replace;
mod errors;
mod logical_op;
mod put_limit;
mod replace_join_by_subselect;
mod select_in;

pub use auto_field::AutoField;
pub use date_func_replace::DateFuncReplace;
pub use errors::RuleError;
pub use logical_op::LogicalOp;
pub use put_limit::PutLimit;
pub use replace_join_by_subselect::ReplaceJoinBySubselect;
pub use select_in::SelectIn;

pub type RuleResult<T> = Result<T, RuleError>;

pub trait Rule {
    fn name(&self) -> &'static str;

    fn apply(&self, query: &mut Query, session: &Session) -> RuleResult<()>;
}

/// Every rule, in the order they run by default.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(PutLimit),
        Box::new(SelectIn),
        Box::new(AutoField),
        Box::new(LogicalOp),
        Box::new(DateFuncReplace),
        Box::new(ReplaceJoinBySubselect),
    ]
}

pub fn optimize(query: &mut Query, rules: &[Box<dyn Rule>], session: &Session) -> RuleResult<()> {
    for rule in rules {
        let before = log::log_enabled!(log::Level::Debug).then(|| query.clone());
        rule.apply(query, session)?;
        if let Some(before) = before {
            let outcome = if before == *query { "no change" } else { "rewritten" };
            log::debug!("rule {} on {}: {}", rule.name(), query.table_name(), outcome);
        }
    }
    Ok(())
}

/// Whether `text` references `alias.` anywhere.
pub(crate) fn references(text: &str, alias: &str) -> bool {
    !alias.is_empty() && crate::query_model::strip_alias_prefixes(text, Some(alias)) != text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_model::ClauseKind;

    #[test]
    fn test_default_rule_order() {
        let names: Vec<&str> = default_rules().iter().map(|rule| rule.name()).collect();
        assert_eq!(
            names,
            [
                "PutLimit",
                "SelectIn",
                "AutoField",
                "LogicalOp",
                "DateFuncReplace",
                "ReplaceJoinBySubselect"
            ]
        );
    }

    #[test]
    fn test_optimize_runs_given_rules_only() {
        let session = Session::default();
        let mut query = Query::new("Product p", &session);
        query.push(ClauseKind::OrderBy, "p.name");
        let rules: Vec<Box<dyn Rule>> = vec![Box::new(PutLimit)];
        query.optimize(Some(rules.as_slice()), &session).unwrap();
        assert_eq!(query.values(ClauseKind::Limit), ["100"]);
        assert!(query.is_empty(ClauseKind::Select));
    }

    #[test]
    fn test_references() {
        assert!(references("v.country = 'BR'", "v"));
        assert!(!references("p.vendor = 'v.x'", "v"));
        assert!(!references("price > 1", ""));
    }
}
