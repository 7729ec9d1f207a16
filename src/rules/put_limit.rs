use crate::query_model::{ClauseKind, Query, Session};

use super::{Rule, RuleResult};

/// Caps an unrestricted scan (no WHERE and no SELECT) at the session's
/// default limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutLimit;

impl Rule for PutLimit {
    fn name(&self) -> &'static str {
        "PutLimit"
    }

    fn apply(&self, query: &mut Query, session: &Session) -> RuleResult<()> {
        if query.is_empty(ClauseKind::Where) && query.is_empty(ClauseKind::Select) {
            query.limit(session.config().default_limit, 0, session);
        }
        Ok(())
    }
}
