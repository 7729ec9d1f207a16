use crate::config::AliasStyle;

use super::session::Session;

/// Split `"Table alias"` into its parts, deriving the alias when absent.
pub fn split_table_name(name: &str, session: &Session) -> (String, String) {
    let name = name.trim();
    if let Some((table, alias)) = name.split_once(char::is_whitespace) {
        return (table.to_string(), alias.trim().to_string());
    }
    (name.to_string(), derive_alias(name, session))
}

/// Alias for a table name without an explicit one.
///
/// Path-like names (`data/Flight.csv`) are reduced to their basename without
/// extension first. Then: underscore initials (`order_item` -> `oi`), the
/// session's alias hook, or the configured built-in style.
pub fn derive_alias(name: &str, session: &Session) -> String {
    let name = name.trim();
    if let Some((_, alias)) = name.split_once(char::is_whitespace) {
        return alias.trim().to_string();
    }
    let base = if name.contains('/') || name.contains('.') {
        basename(name)
    } else {
        name
    };

    if base.contains('_') {
        return base
            .split('_')
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_lowercase)
            .collect();
    }
    if let Some(hook) = session.alias_hook() {
        return hook(base);
    }
    match session.config().alias_style {
        AliasStyle::ThreeLetters => base.to_lowercase().chars().take(3).collect(),
        AliasStyle::FirstLetter => base.to_lowercase().chars().take(1).collect(),
    }
}

fn basename(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(pos) if pos > 0 => &file[..pos],
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn test_explicit_alias() {
        let session = Session::default();
        assert_eq!(
            split_table_name("Product p", &session),
            ("Product".to_string(), "p".to_string())
        );
    }

    #[test]
    fn test_underscore_initials() {
        let session = Session::default();
        assert_eq!(derive_alias("order_line_item", &session), "oli");
    }

    #[test]
    fn test_three_letters_default() {
        let session = Session::default();
        assert_eq!(derive_alias("Product", &session), "pro");
    }

    #[test]
    fn test_first_letter_style() {
        let session = Session::new(SessionConfig {
            alias_style: AliasStyle::FirstLetter,
            ..Default::default()
        });
        assert_eq!(derive_alias("Product", &session), "p");
    }

    #[test]
    fn test_alias_hook_wins_over_style() {
        let session = Session::default().with_alias_hook(|t| format!("{}_x", t.to_lowercase()));
        assert_eq!(derive_alias("Movie", &session), "movie_x");
        // underscore initials still come first
        assert_eq!(derive_alias("movie_cast", &session), "mc");
    }

    #[test]
    fn test_path_like_names_use_basename() {
        let session = Session::default();
        assert_eq!(derive_alias("data/Flight.csv", &session), "fli");
        assert_eq!(derive_alias("sales_2024.parquet", &session), "s2");
    }
}
