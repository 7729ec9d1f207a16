use crate::generator::sql;
use crate::parser::{QueryParser, SqlParser};
use crate::query_model::{parse_condition, ClauseKind, Condition, JoinFragment, JoinType, Query, QueryRole, Session};

use super::{references, Rule, RuleResult};

/// Replaces a JOIN that only filters with a sub-select.
///
/// The query is rendered and parsed back so each joined table's SELECT and
/// WHERE fields are known. A joined table qualifies when it adds no SELECT,
/// GROUP BY or ORDER BY field, has at least one WHERE condition, and no other
/// join goes through it. Its JOIN becomes `outer IN (SELECT key FROM ...)`,
/// or `outer NOT IN (SELECT key FROM ...)` for a LEFT JOIN filtered on
/// `key IS NULL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceJoinBySubselect;

struct Candidate {
    position: usize,
    join: JoinFragment,
    /// `alias.field` on the side that stays
    outer_field: String,
    inner_key: String,
}

fn candidates(query: &Query) -> Vec<Candidate> {
    let joins: Vec<(usize, JoinFragment)> = query
        .values(ClauseKind::From)
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, fragment)| JoinFragment::parse(fragment).map(|join| (i, join)))
        .collect();

    let mut result = Vec::new();
    for (position, join) in &joins {
        let Some(((left_alias, left_field), (right_alias, right_field))) = join.key_pair() else {
            continue;
        };
        let (outer_field, inner_key) = if right_alias == join.alias {
            (format!("{}.{}", left_alias, left_field), right_field)
        } else if left_alias == join.alias {
            (format!("{}.{}", right_alias, right_field), left_field)
        } else {
            continue;
        };
        let downstream = joins
            .iter()
            .any(|(other, fragment)| other != position && references(&fragment.condition, &join.alias));
        if downstream {
            continue;
        }
        result.push(Candidate {
            position: *position,
            join: join.clone(),
            outer_field,
            inner_key,
        });
    }
    result
}

/// Whether every condition is `alias.key IS NULL`.
fn is_anti_join(conditions: &[String], alias: &str, key: &str) -> bool {
    !conditions.is_empty()
        && conditions.iter().all(|text| {
            matches!(
                parse_condition(text),
                Some(Condition::IsNull { field, negated: false })
                    if field.eq_ignore_ascii_case(&format!("{}.{}", alias, key))
            )
        })
}

impl Rule for ReplaceJoinBySubselect {
    fn name(&self) -> &'static str {
        "ReplaceJoinBySubselect"
    }

    fn apply(&self, query: &mut Query, session: &Session) -> RuleResult<()> {
        let candidates = candidates(query);
        if candidates.is_empty() {
            return Ok(());
        }
        let parsed = SqlParser::new(session).parse(&sql::render(query, session, true))?;

        let mut removed = Vec::new();
        let mut subselects = Vec::new();
        for candidate in candidates {
            let alias = candidate.join.alias.as_str();
            let Some(joined) = parsed.iter().find(|q| q.alias() == alias) else {
                continue;
            };
            let used_outside_where = [ClauseKind::Select, ClauseKind::GroupBy, ClauseKind::OrderBy]
                .iter()
                .any(|kind| query.values(*kind).iter().any(|field| references(field, alias)));
            if used_outside_where || !joined.is_empty(ClauseKind::Select) || joined.is_empty(ClauseKind::Where) {
                continue;
            }

            let conditions = joined.values(ClauseKind::Where).to_vec();
            let mut subselect = Query::new(&format!("{} {}", candidate.join.table, alias), session);
            subselect.push(ClauseKind::Select, format!("{}.{}", alias, candidate.inner_key));
            let anti = candidate.join.join_type == JoinType::Left
                && is_anti_join(&conditions, alias, &candidate.inner_key);
            if anti {
                subselect.set_role(QueryRole::NotSelectIn);
            } else {
                subselect.set_role(QueryRole::SelectIn);
                subselect.set_values(ClauseKind::Where, conditions);
            }
            log::debug!(
                "join on {} replaced by {} sub-select",
                candidate.join.table,
                if anti { "NOT IN" } else { "IN" }
            );
            removed.push((candidate.position, alias.to_string()));
            subselects.push((candidate.outer_field, subselect));
        }

        let from: Vec<String> = query
            .values(ClauseKind::From)
            .iter()
            .enumerate()
            .filter(|(i, _)| !removed.iter().any(|(position, _)| position == i))
            .map(|(_, fragment)| fragment.clone())
            .collect();
        query.set_values(ClauseKind::From, from);
        query
            .values_mut(ClauseKind::Where)
            .retain(|condition| !removed.iter().any(|(_, alias)| references(condition, alias)));
        for (outer_field, subselect) in subselects {
            query.apply(&outer_field, &subselect, session)?;
        }
        Ok(())
    }
}
