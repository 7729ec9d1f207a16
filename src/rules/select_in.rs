use crate::expression::format_field;
use crate::query_model::{parse_condition, strip_alias_prefixes, ClauseKind, CompareOp, Condition, Query, Session};

use super::{Rule, RuleResult};

/// `f = a OR f = b OR f = c` becomes `f IN (a,b,c)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectIn;

/// The shared field and the values of an OR of equalities on one field.
fn same_field_equalities(condition: &Condition) -> Option<(&str, Vec<&str>)> {
    let Condition::Or(parts) = condition else {
        return None;
    };
    let mut field: Option<&str> = None;
    let mut values = Vec::with_capacity(parts.len());
    for part in parts {
        let Condition::Compare {
            field: name,
            op: CompareOp::Eq,
            value,
        } = part
        else {
            return None;
        };
        match field {
            Some(first) if !same_name(first, name) => return None,
            Some(_) => {}
            None => field = Some(name),
        }
        values.push(value.as_str());
    }
    field.map(|field| (field, values))
}

fn same_name(a: &str, b: &str) -> bool {
    strip_alias_prefixes(a.trim(), None).eq_ignore_ascii_case(strip_alias_prefixes(b.trim(), None).as_str())
}

impl Rule for SelectIn {
    fn name(&self) -> &'static str {
        "SelectIn"
    }

    fn apply(&self, query: &mut Query, _session: &Session) -> RuleResult<()> {
        let mut rewritten = query.values(ClauseKind::Where).to_vec();
        for condition in rewritten.iter_mut() {
            let Some(parsed) = parse_condition(condition) else {
                continue;
            };
            if let Some((field, values)) = same_field_equalities(&parsed) {
                let field = format_field(field, query);
                log::trace!("{} equalities on {} folded into IN", values.len(), field);
                *condition = format!("{} IN ({})", field, values.join(","));
            }
        }
        query.set_values(ClauseKind::Where, rewritten);
        Ok(())
    }
}
