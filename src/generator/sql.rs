use crate::query_model::{ClauseKind, Query, Session};

use super::{GeneratorError, Renderer};

/// Dialect-aware SQL. Dialect differences live in the stored fragments
/// (`TOP`, `ROWNUM`, function patterns), so rendering only handles layout.
pub struct SqlRenderer<'a> {
    query: &'a Query,
    break_lines: bool,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(query: &'a Query, session: &'a Session) -> Self {
        Self {
            query,
            break_lines: session.config().break_lines,
        }
    }

    /// Single-line layout, used for sub-selects embedded in another query.
    pub fn inline(mut self) -> Self {
        self.break_lines = false;
        self
    }

    fn separator(&self, kind: ClauseKind) -> &'static str {
        match (kind, self.break_lines) {
            (ClauseKind::Where, true) => "\n\tAND ",
            (ClauseKind::Where, false) => " AND ",
            (ClauseKind::From, true) => "\n\t",
            (ClauseKind::From, false) => " ",
            (_, true) => ",\n\t",
            (_, false) => ", ",
        }
    }

    fn clause_text(&self, kind: ClauseKind, values: &[String]) -> String {
        if values.is_empty() {
            return "*".to_string();
        }
        if kind != ClauseKind::From {
            return values.join(self.separator(kind));
        }
        // `, Other o` sources stick to the previous entry
        let mut text = String::new();
        for (i, source) in values.iter().enumerate() {
            if i > 0 && !source.starts_with(',') {
                text.push_str(self.separator(kind));
            }
            text.push_str(source);
        }
        text
    }

    fn join_parts(&self, parts: Vec<(ClauseKind, String)>) -> String {
        let mut text = String::new();
        for (kind, body) in parts {
            if !self.break_lines {
                text.push_str(&format!(" {} {}", kind.keyword(), body));
            } else {
                text.push_str(&format!("\n{}\n\t{}", kind.keyword(), body));
            }
        }
        text.trim().to_string()
    }

    /// The infallible form of [`Renderer::convert`].
    pub fn to_text(&self) -> String {
        let parts = ClauseKind::ALL
            .iter()
            .filter(|&&kind| !self.query.is_empty(kind) || self.has_default(kind))
            .map(|&kind| (kind, self.clause_text(kind, self.query.values(kind))))
            .collect();
        self.join_parts(parts)
    }
}

impl Renderer for SqlRenderer<'_> {
    fn language(&self) -> &'static str {
        "sql"
    }

    fn query(&self) -> &Query {
        self.query
    }

    fn keywords(&self) -> &'static [ClauseKind] {
        &ClauseKind::ALL
    }

    fn format_clause(&mut self, kind: ClauseKind, values: &[String]) -> Result<String, GeneratorError> {
        Ok(self.clause_text(kind, values))
    }

    fn assemble(&mut self, parts: Vec<(ClauseKind, String)>) -> Result<String, GeneratorError> {
        Ok(self.join_parts(parts))
    }
}

/// Render `query` as SQL; `inline` forces the single-line layout.
pub fn render(query: &Query, session: &Session, inline: bool) -> String {
    let renderer = SqlRenderer::new(query, session);
    if inline {
        renderer.inline().to_text()
    } else {
        renderer.to_text()
    }
}
