//! Graph shorthand: `Table(field, group@, $func:alias field?condition^order) -> Table(...)`.
//!
//! Inside the parentheses each separator decides how the text after it is
//! read: `(` and `,` start a field, `?` a condition, `^` an ORDER BY field.
//! An arrow between two tables links them once the right table is closed:
//! `A -> B` makes A the child (foreign field = A's last field) and
//! `A <- B` makes B the child (foreign field = B's first field). The parent
//! key is a field marked with `*`, a key already known, or the parent's
//! first (`->`) or last (`<-`) field.

use crate::expression::{format_field, qualify_condition, Function};
use crate::query_model::{ClauseKind, Query, Session, SortType};

use super::lexer::{self, Token, TokenKind};
use super::{ParserError, QueryParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Field,
    Where,
    Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrow {
    /// `A <- B`
    Left,
    /// `A -> B`
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    First,
    Last,
}

#[derive(Default)]
struct State {
    queries: Vec<Query>,
    /// Fields marked with `*`, per query
    keys: Vec<Option<String>>,
    arrow: Option<Arrow>,
}

pub struct ShorthandParser<'s> {
    session: &'s Session,
}

impl<'s> ShorthandParser<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Walk one `( ... )` body; `tokens` starts at `(` and ends at `)`.
    fn read_body(&self, text: &str, tokens: &[Token<'_>], state: &mut State) -> Result<(), ParserError> {
        let mut depth = 0;
        let mut mode = Mode::Field;
        let mut start = tokens[0].end();
        for token in &tokens[1..] {
            if token.is_open() {
                depth += 1;
                continue;
            }
            if token.is_close() {
                if depth > 0 {
                    depth -= 1;
                    continue;
                }
                self.segment(mode, &text[start..token.start], state)?;
                break;
            }
            if depth > 0 {
                continue;
            }
            let next = if token.is(",") {
                Mode::Field
            } else if token.is("?") {
                Mode::Where
            } else if token.is("^") {
                Mode::Order
            } else {
                continue;
            };
            self.segment(mode, &text[start..token.start], state)?;
            mode = next;
            start = token.end();
        }
        Ok(())
    }

    fn segment(&self, mode: Mode, raw: &str, state: &mut State) -> Result<(), ParserError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(());
        }
        let index = state.queries.len() - 1;
        match mode {
            Mode::Field => self.add_field(text, index, state),
            Mode::Where => {
                // `alias.field ...` may target an earlier table
                let target = text.split_once('.').and_then(|(alias, _)| {
                    state
                        .queries
                        .iter()
                        .position(|query| query.alias().eq_ignore_ascii_case(alias.trim()))
                });
                match target {
                    Some(target) => state.queries[target].push(ClauseKind::Where, text),
                    None => {
                        let condition = qualify_condition(text, &state.queries[index]);
                        state.queries[index].push(ClauseKind::Where, condition);
                    }
                }
                Ok(())
            }
            Mode::Order => {
                let (field, sort) = SortType::split_fragment(text);
                let query = &mut state.queries[index];
                let formatted = format_field(field, query);
                query.insert(ClauseKind::Select, formatted.clone());
                query.push(ClauseKind::OrderBy, format!("{}{}", formatted, sort.suffix()));
                Ok(())
            }
        }
    }

    fn add_field(&self, text: &str, index: usize, state: &mut State) -> Result<(), ParserError> {
        let query = &mut state.queries[index];
        if let Some(spec) = text.strip_prefix('$') {
            let spec = spec.replace(" :", ":").replace(": ", ":");
            let (head, field) = match spec.split_once(char::is_whitespace) {
                Some((head, field)) => (head, field.trim()),
                None => (spec.as_str(), ""),
            };
            let (function, alias) = head
                .split_once(':')
                .ok_or_else(|| ParserError::UnknownSyntax(text.to_string()))?;
            let modifier = Function::from_name(function)?.named(alias);
            let name = if field.is_empty() { "*" } else { field };
            query.apply(name, &modifier, self.session)?;
        } else if let Some(field) = text.strip_suffix('@') {
            query.add_fields(&[field.trim()], false, true, self.session)?;
        } else if text == "*" {
            // every field
        } else if text.starts_with('*') || text.ends_with('*') {
            state.keys[index] = Some(text.trim_matches('*').trim().to_string());
        } else {
            query.add_fields(&[text], false, false, self.session)?;
        }
        Ok(())
    }

    /// Register the foreign key between the last two tables.
    fn link(&self, arrow: Arrow, state: &mut State) -> Result<(), ParserError> {
        let count = state.queries.len();
        if count < 2 {
            return Err(ParserError::UnknownSyntax(
                "arrow without a table on its left".to_string(),
            ));
        }
        let (left, right) = (count - 2, count - 1);
        let (child, parent, foreign_end, key_end) = match arrow {
            Arrow::Right => (left, right, End::Last, End::First),
            Arrow::Left => (right, left, End::First, End::Last),
        };

        let foreign = take_select(&mut state.queries[child], foreign_end)
            .ok_or_else(|| ParserError::MissingKeyContext(state.queries[child].table_name().to_string()))?;
        let known_key = state.keys[parent]
            .clone()
            .or_else(|| state.queries[parent].key_field().map(str::to_string));
        let key = match known_key {
            Some(key) => key,
            None => take_select(&mut state.queries[parent], key_end).ok_or_else(|| {
                ParserError::MissingKeyContext(state.queries[parent].table_name().to_string())
            })?,
        };

        self.session.register_foreign_key(
            state.queries[child].table_name(),
            state.queries[parent].table_name(),
            &foreign,
            Some(&key),
        );
        state.queries[parent].set_key_field(&key);
        Ok(())
    }
}

/// Remove the first or last SELECT field and return its bare name.
fn take_select(query: &mut Query, end: End) -> Option<String> {
    let select = query.values_mut(ClauseKind::Select);
    let field = match end {
        End::First if !select.is_empty() => select.remove(0),
        End::Last => select.pop()?,
        End::First => return None,
    };
    let name = field.rsplit('.').next().unwrap_or(&field).trim().to_string();
    Some(name)
}

impl QueryParser for ShorthandParser<'_> {
    fn evaluate(&self, text: &str, tokens: &[Token<'_>]) -> Result<Vec<Query>, ParserError> {
        let mut state = State::default();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if token.is("<-") || token.is("->") {
                state.arrow = Some(if token.is("<-") { Arrow::Left } else { Arrow::Right });
                i += 1;
                continue;
            }
            if token.kind != TokenKind::Word {
                return Err(ParserError::UnexpectedToken {
                    token: token.text.to_string(),
                    offset: token.start,
                });
            }

            let mut name = token.text.to_string();
            let mut open = i + 1;
            if let Some(alias) = tokens.get(open).filter(|t| t.kind == TokenKind::Word) {
                name = format!("{} {}", name, alias.text);
                open += 1;
            }
            if !tokens.get(open).is_some_and(|t| t.is("(")) {
                let offset = tokens.get(open).map_or(text.len(), |t| t.start);
                return Err(ParserError::UnexpectedToken {
                    token: tokens.get(open).map_or(String::new(), |t| t.text.to_string()),
                    offset,
                });
            }
            let close = lexer::matching_close(tokens, open)?;

            state.queries.push(Query::new(&name, self.session));
            state.keys.push(None);
            self.read_body(text, &tokens[open..=close], &mut state)?;
            if let Some(key) = state.keys.last().cloned().flatten() {
                if let Some(query) = state.queries.last_mut() {
                    query.set_key_field(&key);
                }
            }
            if let Some(arrow) = state.arrow.take() {
                self.link(arrow, &mut state)?;
            }
            i = close + 1;
        }
        log::debug!("shorthand: {} queries", state.queries.len());
        Ok(state.queries)
    }
}
