use std::sync::LazyLock;

use regex::Regex;

use crate::query_model::clause::strip_prefix_ignore_case;
use crate::query_model::{ClauseKind, Query, Session, SortType};

use super::{Rule, RuleResult};

/// With GROUP BY, SELECT mirrors the grouping keys and ORDER BY is dropped.
/// Otherwise every ORDER BY field is added to SELECT.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoField;

/// A GROUP BY fragment without its HAVING tail.
fn grouping_key(fragment: &str) -> &str {
    match HAVING.find(fragment) {
        Some(found) => fragment[..found.start()].trim(),
        None => fragment.trim(),
    }
}

static HAVING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+HAVING\s").unwrap());

impl Rule for AutoField {
    fn name(&self) -> &'static str {
        "AutoField"
    }

    fn apply(&self, query: &mut Query, _session: &Session) -> RuleResult<()> {
        if !query.is_empty(ClauseKind::GroupBy) {
            let keys: Vec<String> = query
                .values(ClauseKind::GroupBy)
                .iter()
                .map(|fragment| grouping_key(fragment).to_string())
                .collect();
            query.set_values(ClauseKind::Select, keys);
            query.set_values(ClauseKind::OrderBy, Vec::new());
            return Ok(());
        }
        let named = query.named_fields();
        let fields: Vec<String> = query
            .values(ClauseKind::OrderBy)
            .iter()
            .map(|fragment| SortType::split_fragment(fragment).0.trim().to_string())
            .filter(|field| !named.iter().any(|n| n.eq_ignore_ascii_case(field)))
            .filter(|field| strip_prefix_ignore_case(field, "CASE ").is_none())
            .collect();
        query.update_values(ClauseKind::Select, &fields);
        Ok(())
    }
}
