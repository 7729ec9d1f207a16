//! Field normalization used by `Query::diff` and by renderers of targets
//! that have no alias concept.

use super::clause::{strip_prefix_ignore_case, ClauseKind, JoinType, SortType};

/// Remove `alias.` qualifiers from identifiers outside quoted literals.
///
/// With `only = Some(a)` just the qualifiers equal to `a` (case-insensitive)
/// are removed. Numeric literals such as `10.5` are never touched.
pub fn strip_alias_prefixes(text: &str, only: Option<&str>) -> String {
    replace_qualifiers(text, |qualifier| {
        only.map_or(true, |alias| alias.eq_ignore_ascii_case(qualifier))
            .then_some("")
    })
}

/// Replace the `from.` qualifier with `to.` outside quoted literals.
pub fn rename_alias(text: &str, from: &str, to: &str) -> String {
    if from == to {
        return text.to_string();
    }
    replace_qualifiers(text, |qualifier| (qualifier == from).then_some(to))
}

/// Scan `text` for `qualifier.name` and let `replace` decide: `None` keeps
/// it, `Some("")` drops the qualifier, `Some(x)` rewrites it to `x.`.
fn replace_qualifiers<'a>(text: &str, replace: impl Fn(&str) -> Option<&'a str>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            result.push(c);
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
            result.push(c);
            i += 1;
            continue;
        }
        let starts_identifier = (c.is_alphabetic() || c == '_')
            && (i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_' || chars[i - 1] == '.'));
        if !starts_identifier {
            result.push(c);
            i += 1;
            continue;
        }

        let mut end = i;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let identifier: String = chars[i..end].iter().collect();
        let is_qualifier = end + 1 < chars.len()
            && chars[end] == '.'
            && (chars[end + 1].is_alphabetic() || matches!(chars[end + 1], '_' | '*' | '"'));
        match is_qualifier.then(|| replace(&identifier)).flatten() {
            Some("") => i = end + 1,
            Some(new) => {
                result.push_str(new);
                result.push('.');
                i = end + 1;
            }
            None => {
                result.push_str(&identifier);
                i = end;
            }
        }
    }
    result
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn is_case_expression(text: &str) -> bool {
    strip_prefix_ignore_case(text.trim_start(), "CASE")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

/// `expr AS name` (outside quotes and parentheses).
pub(crate) fn named_field_alias(text: &str) -> Option<&str> {
    let words = super::clause::top_level_words(text);
    let n = words.len();
    if n < 2 {
        return None;
    }
    let (s, e) = words[n - 2];
    if !text[s..e].eq_ignore_ascii_case("AS") {
        return None;
    }
    let (s, e) = words[n - 1];
    if text[e..].trim().is_empty() {
        Some(&text[s..e])
    } else {
        None
    }
}

/// `name(...)` somewhere in the field.
pub(crate) fn is_function_call(text: &str) -> bool {
    let mut previous_is_word = false;
    for c in text.chars() {
        if c == '(' && previous_is_word {
            return true;
        }
        previous_is_word = c.is_alphanumeric() || c == '_';
    }
    false
}

pub(crate) fn is_numeric_literal(text: &str) -> bool {
    let text = text.trim().trim_start_matches('-');
    !text.is_empty() && text.parse::<f64>().is_ok()
}

/// A FROM entry of the form `[LEFT|RIGHT|FULL] JOIN table alias ON (a.f = b.g)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinFragment {
    pub join_type: JoinType,
    pub table: String,
    pub alias: String,
    pub condition: String,
}

impl JoinFragment {
    pub fn parse(text: &str) -> Option<JoinFragment> {
        let text = text.trim();
        let mut words = text.split_whitespace().peekable();
        let mut join_type = JoinType::Inner;

        let mut word = words.next()?;
        if let Some(kind) = JoinType::from_keyword(word) {
            join_type = kind;
            word = words.next()?;
            if word.eq_ignore_ascii_case("OUTER") {
                word = words.next()?;
            }
        }
        if !word.eq_ignore_ascii_case("JOIN") {
            return None;
        }
        let table = words.next()?.to_string();
        let mut alias = String::new();
        if let Some(next) = words.peek() {
            if !next.eq_ignore_ascii_case("ON") {
                alias = next.to_string();
                words.next();
            }
        }
        let on = words.next()?;
        if !on.eq_ignore_ascii_case("ON") {
            return None;
        }
        let condition = words.collect::<Vec<_>>().join(" ");
        let condition = strip_outer_parentheses(&condition).to_string();
        if alias.is_empty() {
            alias = table.clone();
        }
        Some(JoinFragment {
            join_type,
            table,
            alias,
            condition,
        })
    }

    pub fn to_fragment(&self) -> String {
        format!(
            "{}JOIN {} {} ON ({})",
            self.join_type.prefix(),
            self.table,
            self.alias,
            self.condition
        )
    }

    /// `((alias, field), (alias, field))` when the condition is a plain
    /// qualified equality.
    pub fn key_pair(&self) -> Option<((String, String), (String, String))> {
        parse_key_equality(&self.condition)
    }
}

/// Parse `a.f = b.g`.
pub(crate) fn parse_key_equality(condition: &str) -> Option<((String, String), (String, String))> {
    let condition = strip_outer_parentheses(condition);
    let (left, right) = condition.split_once('=')?;
    if left.ends_with(['<', '>', '!']) || right.starts_with('=') {
        return None;
    }
    let side = |text: &str| -> Option<(String, String)> {
        let (alias, field) = text.trim().split_once('.')?;
        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
        (valid(alias) && valid(field)).then(|| (alias.to_string(), field.to_string()))
    };
    Some((side(left)?, side(right)?))
}

pub(crate) fn strip_outer_parentheses(text: &str) -> &str {
    let mut text = text.trim();
    while text.starts_with('(') && text.ends_with(')') && encloses_all(text) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

fn encloses_all(text: &str) -> bool {
    let mut depth = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != text.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Reduce one atomic field of `kind` to its comparable form.
///
/// `exact = false` is the duplicate check used while inserting: only the
/// query's own alias is removed. `exact = true` is the equality form: every
/// qualifier, quote and blank is dropped and the text is lower-cased. CASE
/// expressions and named SELECT fields are opaque atoms in both modes.
pub fn normalize_field(kind: ClauseKind, fragment: &str, exact: bool, own_alias: &str) -> String {
    let text = collapse_whitespace(fragment);
    let finish = |text: String| -> String {
        if exact {
            text.chars()
                .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
                .collect::<String>()
                .to_lowercase()
        } else {
            text
        }
    };

    if is_case_expression(&text) {
        return if exact { text.to_lowercase() } else { text };
    }
    if kind == ClauseKind::Select && named_field_alias(&text).is_some() {
        return if exact { text.to_lowercase() } else { text };
    }

    let text = match kind {
        ClauseKind::Select => strip_prefix_ignore_case(&text, "DISTINCT ")
            .map(str::to_string)
            .unwrap_or(text),
        ClauseKind::From => return finish(normalize_source(&text, exact)),
        ClauseKind::OrderBy => {
            let (field, sort) = SortType::split_fragment(&text);
            if exact {
                format!("{}{}", field, sort.suffix())
            } else {
                field.to_string()
            }
        }
        _ => text,
    };

    let keep_qualifiers = matches!(
        kind,
        ClauseKind::Select | ClauseKind::GroupBy | ClauseKind::OrderBy
    ) && (is_function_call(&text) || is_numeric_literal(&text));
    let text = if keep_qualifiers {
        text
    } else if exact {
        strip_alias_prefixes(&text, None)
    } else {
        strip_alias_prefixes(&text, Some(own_alias))
    };
    finish(text)
}

fn normalize_source(text: &str, exact: bool) -> String {
    if let Some(join) = JoinFragment::parse(text) {
        if !exact {
            return join.to_fragment();
        }
        let condition = match join.key_pair() {
            Some(((_, f1), (_, f2))) => {
                let mut sides = [f1, f2];
                sides.sort();
                format!("{}={}", sides[0], sides[1])
            }
            None => strip_alias_prefixes(&join.condition, None),
        };
        return format!("{}JOIN {} ON {}", join.join_type.prefix(), join.table, condition);
    }
    if exact {
        let source = text.trim_start_matches(',').trim();
        return source.split_whitespace().next().unwrap_or_default().to_string();
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_alias_prefixes() {
        assert_eq!(strip_alias_prefixes("p.price > 10.5", None), "price > 10.5");
        assert_eq!(strip_alias_prefixes("Sum(s.value)", None), "Sum(value)");
        assert_eq!(strip_alias_prefixes("p.name = 'a.b'", None), "name = 'a.b'");
        assert_eq!(strip_alias_prefixes("p.id = s.id", Some("p")), "id = s.id");
    }

    #[test]
    fn test_rename_alias() {
        assert_eq!(rename_alias("prod.price > 1", "prod", "p"), "p.price > 1");
        assert_eq!(rename_alias("Sum(prod.x)", "prod", "p"), "Sum(p.x)");
        assert_eq!(rename_alias("production.x", "prod", "p"), "production.x");
    }

    #[test]
    fn test_named_field_alias() {
        assert_eq!(named_field_alias("Sum(s.value) as total"), Some("total"));
        assert_eq!(named_field_alias("'dec-24' AS period"), Some("period"));
        assert_eq!(named_field_alias("p.name"), None);
    }

    #[test]
    fn test_join_fragment_parse() {
        let join = JoinFragment::parse("LEFT JOIN Student s ON (c.student_id = s.id)").unwrap();
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.table, "Student");
        assert_eq!(join.alias, "s");
        assert_eq!(join.condition, "c.student_id = s.id");
        assert_eq!(
            join.key_pair(),
            Some((
                ("c".to_string(), "student_id".to_string()),
                ("s".to_string(), "id".to_string())
            ))
        );
        assert!(JoinFragment::parse("Student s").is_none());
    }

    #[test]
    fn test_normalize_exact_where() {
        let a = normalize_field(ClauseKind::Where, "p.category = 'Gizmo'", true, "p");
        let b = normalize_field(ClauseKind::Where, "prod.category='gizmo'", true, "prod");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_keeps_foreign_alias_when_inserting() {
        let own = normalize_field(ClauseKind::Select, "c.name", false, "c");
        let foreign = normalize_field(ClauseKind::Select, "s.name", false, "c");
        assert_eq!(own, "name");
        assert_eq!(foreign, "s.name");
    }

    #[test]
    fn test_normalize_join_sides_are_unordered() {
        let a = normalize_field(ClauseKind::From, "JOIN Student s ON (c.student_id = s.id)", true, "c");
        let b = normalize_field(ClauseKind::From, "JOIN Student stu ON (stu.id = cla.student_id)", true, "cla");
        assert_eq!(a, b);
    }
}
