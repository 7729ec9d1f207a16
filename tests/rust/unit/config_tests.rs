use std::io::Write;

use sqlblocks::config::{AliasStyle, ConfigError};
use sqlblocks::{Dialect, SessionConfig};

#[test]
fn test_yaml_partial_config_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "dialect: oracle\nalias_style: first_letter").unwrap();

    let config = SessionConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.dialect, Dialect::Oracle);
    assert_eq!(config.alias_style, AliasStyle::FirstLetter);
    assert_eq!(config.default_limit, 100);
    assert!(config.break_lines);
}

#[test]
fn test_yaml_unknown_dialect() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "dialect: sybase").unwrap();
    assert!(matches!(
        SessionConfig::from_yaml_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_missing_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SessionConfig::from_yaml_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Parse { field, .. }) if field == "yaml_file"));
}

#[test]
fn test_alias_style_from_str() {
    assert_eq!("first-letter".parse::<AliasStyle>().unwrap(), AliasStyle::FirstLetter);
    assert!(matches!(
        "initials".parse::<AliasStyle>(),
        Err(ConfigError::UnknownAliasStyle(_))
    ));
}
