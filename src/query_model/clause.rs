//! Clause kinds and the clause-specific separators used to break a stored
//! fragment into atomic fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six clause slots of a query.
///
/// The declaration order is the rendering order of a SQL statement and the
/// iteration order of `Query::clauses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Limit,
}

impl ClauseKind {
    pub const ALL: [ClauseKind; 6] = [
        ClauseKind::Select,
        ClauseKind::From,
        ClauseKind::Where,
        ClauseKind::GroupBy,
        ClauseKind::OrderBy,
        ClauseKind::Limit,
    ];

    /// Every clause except FROM, which merges handle separately.
    pub const USUAL: [ClauseKind; 5] = [
        ClauseKind::Select,
        ClauseKind::Where,
        ClauseKind::GroupBy,
        ClauseKind::OrderBy,
        ClauseKind::Limit,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            ClauseKind::Select => "SELECT",
            ClauseKind::From => "FROM",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Limit => "LIMIT",
        }
    }

    /// Split a clause value into its atomic fields.
    ///
    /// Commas for the field lists, top-level `AND` for WHERE (the `AND` of a
    /// `BETWEEN` is kept), `JOIN` boundaries for FROM.
    pub fn split(&self, text: &str) -> Vec<String> {
        match self {
            ClauseKind::Select | ClauseKind::GroupBy | ClauseKind::OrderBy => {
                split_top_level(text, ',')
            }
            ClauseKind::Where => split_conditions(text),
            ClauseKind::From => split_joins(text),
            ClauseKind::Limit => {
                let text = text.trim();
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
        }
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    #[default]
    Asc,
    Desc,
}

impl SortType {
    /// Suffix appended to an ORDER BY field.
    pub fn suffix(&self) -> &'static str {
        match self {
            SortType::Asc => "",
            SortType::Desc => " DESC",
        }
    }

    /// Split a stored ORDER BY fragment into field and direction.
    pub fn split_fragment(fragment: &str) -> (&str, SortType) {
        let trimmed = fragment.trim();
        if let Some(field) = strip_suffix_ignore_case(trimmed, " DESC") {
            (field.trim_end(), SortType::Desc)
        } else if let Some(field) = strip_suffix_ignore_case(trimmed, " ASC") {
            (field.trim_end(), SortType::Asc)
        } else {
            (trimmed, SortType::Asc)
        }
    }
}

pub(crate) fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = text.len().checked_sub(suffix.len())?;
    if text.is_char_boundary(cut) && text[cut..].eq_ignore_ascii_case(suffix) {
        Some(&text[..cut])
    } else {
        None
    }
}

pub(crate) fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn prefix(&self) -> &'static str {
        match self {
            JoinType::Inner => "",
            JoinType::Left => "LEFT ",
            JoinType::Right => "RIGHT ",
            JoinType::Full => "FULL ",
        }
    }

    pub fn from_keyword(word: &str) -> Option<JoinType> {
        match word.to_uppercase().as_str() {
            "INNER" => Some(JoinType::Inner),
            "LEFT" => Some(JoinType::Left),
            "RIGHT" => Some(JoinType::Right),
            "FULL" => Some(JoinType::Full),
            _ => None,
        }
    }
}

/// Byte ranges of the words sitting outside quotes and parentheses.
pub(crate) fn top_level_words(text: &str) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && (c.is_alphanumeric() || c == '_') {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            words.push((s, i));
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, text.len()));
    }
    words
}

/// Split on `separator` wherever it is outside quotes and parentheses.
pub fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut result = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ if c == separator && depth == 0 => {
                    push_trimmed(&mut result, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(c);
    }
    push_trimmed(&mut result, &current);
    result
}

/// Split a WHERE value on its top-level `AND` keywords.
pub fn split_conditions(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut last = 0;
    let mut inside_between = false;

    for (start, end) in top_level_words(text) {
        let word = &text[start..end];
        if word.eq_ignore_ascii_case("BETWEEN") {
            inside_between = true;
        } else if word.eq_ignore_ascii_case("AND") {
            if inside_between {
                inside_between = false;
                continue;
            }
            push_trimmed(&mut result, &text[last..start]);
            last = end;
        }
    }
    push_trimmed(&mut result, &text[last..]);
    result
}

/// Split a FROM value before each `[LEFT|RIGHT|FULL|INNER] [OUTER] JOIN`.
pub fn split_joins(text: &str) -> Vec<String> {
    let words = top_level_words(text);
    let mut cuts = Vec::new();

    for (i, &(start, end)) in words.iter().enumerate() {
        if !text[start..end].eq_ignore_ascii_case("JOIN") {
            continue;
        }
        let mut cut = start;
        let mut j = i;
        while j > 0 {
            let (s, e) = words[j - 1];
            let word = &text[s..e];
            if JoinType::from_keyword(word).is_some() || word.eq_ignore_ascii_case("OUTER") {
                cut = s;
                j -= 1;
            } else {
                break;
            }
        }
        cuts.push(cut);
    }

    let mut result = Vec::new();
    let mut last = 0;
    for cut in cuts {
        push_trimmed(&mut result, &text[last..cut]);
        last = cut;
    }
    push_trimmed(&mut result, &text[last..]);
    result
}

fn push_trimmed(result: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        result.push(text.to_string());
    }
}
