//! Engine configuration loaded from a JSON file: the active dialect and
//! entity-to-table overrides used when registering the demo entities.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend dialect name: `postgres` (default), `mysql` or `sqlite`.
    #[serde(default)]
    pub dialect: Option<String>,
    /// Entity name to physical table name overrides.
    #[serde(default)]
    pub tables: HashMap<String, String>,
}

impl EngineConfig {
    /// Loads the configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(QueryError::Config {
                message: format!("config file does not exist: {}", path.display()),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| QueryError::Config {
            message: format!("cannot read config file {}: {}", path.display(), e),
        })?;

        serde_json::from_str(&content).map_err(|e| QueryError::Config {
            message: format!("cannot parse config file {}: {}", path.display(), e),
        })
    }

    /// The configured dialect, defaulting to Postgres.
    pub fn dialect(&self) -> Result<Dialect> {
        match &self.dialect {
            None => Ok(Dialect::default()),
            Some(name) => Dialect::from_name(name).ok_or_else(|| QueryError::Config {
                message: format!("unknown dialect '{}'", name),
            }),
        }
    }

    /// The physical table for an entity, defaulting to the entity name.
    pub fn table_for<'a>(&'a self, entity: &'a str) -> &'a str {
        self.tables.get(entity).map(String::as_str).unwrap_or(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    fn temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let path = env::temp_dir().join(format!("resource_query_{}.json", name));
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_json_config() {
        let path = temp_config(
            "valid",
            r#"{ "dialect": "sqlite", "tables": { "book": "books" } }"#,
        );
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::Sqlite);
        assert_eq!(config.table_for("book"), "books");
        assert_eq!(config.table_for("publisher"), "publisher");
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let path = temp_config("invalid", "not json");
        let result = EngineConfig::from_json_file(&path);
        assert!(matches!(result, Err(QueryError::Config { .. })));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_json_file("does_not_exist.json");
        assert!(matches!(result, Err(QueryError::Config { .. })));
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let path = temp_config("dialect", r#"{ "dialect": "oracle" }"#);
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(matches!(config.dialect(), Err(QueryError::Config { .. })));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert_eq!(config.table_for("book"), "book");
    }
}
