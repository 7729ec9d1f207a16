//! Structured view of a stored WHERE fragment, for targets and rules that
//! need more than the raw text.

use std::fmt;

use super::clause::{split_top_level, strip_prefix_ignore_case, top_level_words};
use super::normalize::strip_outer_parentheses;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// Longest symbols first so `>=` is not read as `>`.
    const SYMBOLS: [(&'static str, CompareOp); 7] = [
        ("<>", CompareOp::Ne),
        ("!=", CompareOp::Ne),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("=", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<CompareOp> {
        Self::SYMBOLS
            .iter()
            .find(|(s, _)| *s == symbol.trim())
            .map(|(_, op)| *op)
    }

    /// The operator equivalent to `NOT (a <op> b)`.
    pub fn inverse(&self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Gt => CompareOp::Lte,
            CompareOp::Gte => CompareOp::Lt,
            CompareOp::Lt => CompareOp::Gte,
            CompareOp::Lte => CompareOp::Gt,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: String,
    },
    In {
        field: String,
        values: Vec<String>,
        negated: bool,
    },
    Between {
        field: String,
        low: String,
        high: String,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
        negated: bool,
    },
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Not(Box<Condition>),
}

/// Parse one WHERE fragment. `None` for shapes outside this small grammar
/// (sub-selects, arbitrary expressions).
pub fn parse_condition(text: &str) -> Option<Condition> {
    let text = strip_outer_parentheses(text);
    if text.is_empty() {
        return None;
    }

    let or_parts = split_on_keyword(text, "OR");
    if or_parts.len() > 1 {
        return or_parts
            .iter()
            .map(|part| parse_condition(part))
            .collect::<Option<Vec<_>>>()
            .map(Condition::Or);
    }
    let and_parts = super::clause::split_conditions(text);
    if and_parts.len() > 1 {
        return and_parts
            .iter()
            .map(|part| parse_condition(part))
            .collect::<Option<Vec<_>>>()
            .map(Condition::And);
    }
    if let Some(rest) = strip_prefix_ignore_case(text, "NOT ") {
        return parse_condition(rest).map(|inner| Condition::Not(Box::new(inner)));
    }

    let words = top_level_words(text);
    let word = |i: usize| -> &str {
        let (s, e) = words[i];
        &text[s..e]
    };
    for i in 0..words.len() {
        let keyword = word(i).to_uppercase();
        let field = text[..words[i].0].trim();
        let negated = field
            .rsplit(char::is_whitespace)
            .next()
            .is_some_and(|w| w.eq_ignore_ascii_case("NOT"));
        let field = if negated {
            field[..field.len() - 3].trim()
        } else {
            field
        };
        match keyword.as_str() {
            "BETWEEN" if !field.is_empty() => {
                let rest = &text[words[i].1..];
                let and = words
                    .iter()
                    .skip(i + 1)
                    .find(|(s, e)| text[*s..*e].eq_ignore_ascii_case("AND"))?;
                let low = text[words[i].1..and.0].trim();
                let high = text[and.1..].trim();
                if low.is_empty() || high.is_empty() || rest.is_empty() {
                    return None;
                }
                return Some(Condition::Between {
                    field: field.to_string(),
                    low: low.to_string(),
                    high: high.to_string(),
                });
            }
            "IN" if !field.is_empty() => {
                let list = text[words[i].1..].trim();
                let inner = list.strip_prefix('(')?.strip_suffix(')')?;
                if strip_prefix_ignore_case(inner.trim_start(), "SELECT ").is_some() {
                    return None;
                }
                return Some(Condition::In {
                    field: field.to_string(),
                    values: split_top_level(inner, ','),
                    negated,
                });
            }
            "IS" if !field.is_empty() => {
                let rest: Vec<String> = (i + 1..words.len()).map(|j| word(j).to_uppercase()).collect();
                return match rest.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                    ["NULL"] => Some(Condition::IsNull {
                        field: field.to_string(),
                        negated: false,
                    }),
                    ["NOT", "NULL"] => Some(Condition::IsNull {
                        field: field.to_string(),
                        negated: true,
                    }),
                    _ => None,
                };
            }
            "LIKE" if !field.is_empty() => {
                let pattern = text[words[i].1..].trim();
                return Some(Condition::Like {
                    field: field.to_string(),
                    pattern: unquote(pattern).to_string(),
                    negated,
                });
            }
            _ => {}
        }
    }

    let (position, symbol, op) = find_operator(text)?;
    let field = text[..position].trim();
    let value = text[position + symbol.len()..].trim();
    if field.is_empty() || value.is_empty() {
        return None;
    }
    Some(Condition::Compare {
        field: field.to_string(),
        op,
        value: value.to_string(),
    })
}

/// First comparison operator outside quotes and parentheses.
fn find_operator(text: &str) -> Option<(usize, &'static str, CompareOp)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            '<' | '>' | '=' | '!' if depth == 0 => {
                let rest = &text[i..];
                return CompareOp::SYMBOLS
                    .iter()
                    .find(|(symbol, _)| rest.starts_with(symbol))
                    .map(|(symbol, op)| (i, *symbol, *op));
            }
            _ => {}
        }
    }
    None
}

fn split_on_keyword(text: &str, keyword: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut last = 0;
    for (s, e) in top_level_words(text) {
        if text[s..e].eq_ignore_ascii_case(keyword) {
            parts.push(text[last..s].trim().to_string());
            last = e;
        }
    }
    parts.push(text[last..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Drop one pair of surrounding quotes.
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn is_quoted(value: &str) -> bool {
    let value = value.trim();
    value.len() >= 2
        && ((value.starts_with('\'') && value.ends_with('\''))
            || (value.starts_with('"') && value.ends_with('"')))
}
