use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::query_model::SortType;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unknown SQL dialect '{0}' (expected ansi, sqlserver, oracle, postgres or mysql)")]
    UnknownDialect(String),

    #[error("Unknown alias style '{0}' (expected three_letters or first_letter)")]
    UnknownAliasStyle(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Target SQL database family. Affects function spelling and row limiting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Ansi,
    SqlServer,
    Oracle,
    Postgres,
    MySql,
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ansi" => Ok(Dialect::Ansi),
            "sqlserver" | "sql_server" | "mssql" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Ansi => "ansi",
            Dialect::SqlServer => "sqlserver",
            Dialect::Oracle => "oracle",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        };
        f.write_str(name)
    }
}

/// Built-in alias derivation used when a table name carries no explicit alias
/// and contains no underscore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasStyle {
    /// `Product` -> `pro`
    #[default]
    ThreeLetters,
    /// `Product` -> `p`
    FirstLetter,
}

impl FromStr for AliasStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "three_letters" | "three-letters" => Ok(AliasStyle::ThreeLetters),
            "first_letter" | "first-letter" => Ok(AliasStyle::FirstLetter),
            other => Err(ConfigError::UnknownAliasStyle(other.to_string())),
        }
    }
}

/// Session configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SQL dialect used by `limit()` and dialect-aware functions
    pub dialect: Dialect,

    /// Row cap used by `Query::limit` defaults and the PutLimit rule
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Default limit must be between 1 and 1000000"
    ))]
    pub default_limit: u32,

    /// Multi-line layout for rendered text
    pub break_lines: bool,

    /// Fallback alias derivation
    pub alias_style: AliasStyle,

    /// Direction used by OrderBy modifiers created without one
    pub sort: SortType,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Ansi,
            default_limit: 100,
            break_lines: true,
            alias_style: AliasStyle::ThreeLetters,
            sort: SortType::Asc,
        }
    }
}

impl SessionConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            dialect: parse_env_var("SQLBLOCKS_DIALECT", "ansi")?,
            default_limit: parse_env_var("SQLBLOCKS_DEFAULT_LIMIT", "100")?,
            break_lines: parse_env_var("SQLBLOCKS_BREAK_LINES", "true")?,
            alias_style: parse_env_var("SQLBLOCKS_ALIAS_STYLE", "three_letters")?,
            sort: SortType::Asc,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dialect, Dialect::Ansi);
        assert_eq!(config.default_limit, 100);
        assert!(config.break_lines);
    }

    #[test]
    fn test_invalid_default_limit() {
        let config = SessionConfig {
            default_limit: 0, // Invalid
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("SQLServer".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!(matches!(
            "db2".parse::<Dialect>(),
            Err(ConfigError::UnknownDialect(_))
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dialect: oracle\ndefault_limit: 25\nbreak_lines: false").unwrap();

        let config = SessionConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.dialect, Dialect::Oracle);
        assert_eq!(config.default_limit, 25);
        assert!(!config.break_lines);
        assert_eq!(config.alias_style, AliasStyle::ThreeLetters);
    }

    #[test]
    fn test_from_yaml_file_rejects_invalid_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_limit: 5000000").unwrap();

        assert!(matches!(
            SessionConfig::from_yaml_file(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }
}
