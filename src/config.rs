// ABOUTME: Connection configuration for SQL Server records
// ABOUTME: Loads per-environment connection settings from a JSON file and validates them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Environment not found in config: {0}")]
    EnvironmentNotFound(String),
    #[error("Unsupported adapter: {0} (expected \"sqlserver\")")]
    UnsupportedAdapter(String),
    #[error("Unsupported connection mode: {0} (expected \"dblib\")")]
    UnsupportedMode(String),
    #[error("No database name configured")]
    MissingDatabase,
}

pub const SQLSERVER_ADAPTER: &str = "sqlserver";
pub const DBLIB_MODE: &str = "dblib";

/// Connection settings for one SQL Server database.
///
/// Mirrors the shape of a `sql_server.yml` entry: the common keys plus the
/// driver extras. `encoding` and `tds_version` are accepted for compatibility
/// but tiberius always speaks UTF-16 over the TDS version it was built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_adapter")]
    pub adapter: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub dataserver: Option<String>,
    #[serde(default)]
    pub tds_version: Option<String>,
    #[serde(default)]
    pub appname: Option<String>,
    /// Seconds allowed for the login handshake
    #[serde(default)]
    pub login_timeout: Option<u64>,
    /// Seconds allowed for each statement
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub azure: bool,
    #[serde(default)]
    pub contained: bool,
    #[serde(default = "default_true")]
    pub trust_certificate: bool,
    /// Directory that relative script paths resolve against
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_adapter() -> String {
    SQLSERVER_ADAPTER.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1433
}

fn default_encoding() -> String {
    "utf8".to_string()
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            mode: Some(DBLIB_MODE.to_string()),
            host: default_host(),
            port: default_port(),
            database: String::new(),
            username: None,
            password: None,
            collation: None,
            encoding: default_encoding(),
            dataserver: None,
            tds_version: None,
            appname: None,
            login_timeout: None,
            timeout: None,
            azure: false,
            contained: false,
            trust_certificate: true,
            root: default_root(),
        }
    }
}

impl ConnectionConfig {
    /// Shortcut for tests and embedding code that build configs by hand
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Check the settings this crate depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.adapter.eq_ignore_ascii_case(SQLSERVER_ADAPTER) {
            return Err(ConfigError::UnsupportedAdapter(self.adapter.clone()));
        }
        if let Some(mode) = &self.mode {
            if !mode.eq_ignore_ascii_case(DBLIB_MODE) {
                return Err(ConfigError::UnsupportedMode(mode.clone()));
            }
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::MissingDatabase);
        }
        Ok(())
    }

    /// Host to dial; `dataserver` stands in when no host is set
    pub fn server_host(&self) -> &str {
        match &self.dataserver {
            Some(server) if self.host.is_empty() => server,
            _ => &self.host,
        }
    }

    pub fn login_timeout(&self) -> Option<Duration> {
        self.login_timeout.map(Duration::from_secs)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Resolve a script path against `root`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// A config file holding one `ConnectionConfig` per environment
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ConfigFile {
    pub environments: HashMap<String, ConnectionConfig>,
}

impl ConfigFile {
    pub fn default_path() -> PathBuf {
        PathBuf::from("config").join("sql_server.json")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&contents)?;
        Ok(file)
    }

    /// Get the settings for one environment
    pub fn config_for(&self, environment: &str) -> Result<&ConnectionConfig, ConfigError> {
        self.environments
            .get(environment)
            .ok_or_else(|| ConfigError::EnvironmentNotFound(environment.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.adapter, "sqlserver");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1433);
        assert_eq!(config.encoding, "utf8");
        assert!(config.trust_certificate);
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"database": "myapp_development"}"#).unwrap();
        assert_eq!(config.database, "myapp_development");
        assert_eq!(config.port, 1433);
        assert_eq!(config.root, PathBuf::from("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_other_adapters() {
        let config = ConnectionConfig {
            adapter: "postgresql".to_string(),
            ..ConnectionConfig::for_database("app")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedAdapter(a)) if a == "postgresql"
        ));
    }

    #[test]
    fn test_validate_rejects_odbc_mode() {
        let config = ConnectionConfig {
            mode: Some("odbc".to_string()),
            ..ConnectionConfig::for_database("app")
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedMode(_))));
    }

    #[test]
    fn test_validate_requires_database() {
        let config = ConnectionConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingDatabase)));
    }

    #[test]
    fn test_dataserver_used_when_host_empty() {
        let config = ConnectionConfig {
            host: String::new(),
            dataserver: Some("db.internal".to_string()),
            ..ConnectionConfig::for_database("app")
        };
        assert_eq!(config.server_host(), "db.internal");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = ConnectionConfig {
            root: PathBuf::from("/srv/app"),
            ..ConnectionConfig::for_database("app")
        };
        assert_eq!(
            config.resolve(Path::new("db/structure.sql")),
            PathBuf::from("/srv/app/db/structure.sql")
        );
        assert_eq!(
            config.resolve(Path::new("/tmp/seed.sql")),
            PathBuf::from("/tmp/seed.sql")
        );
    }

    #[test]
    fn test_config_file_environments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sql_server.json");
        fs::write(
            &path,
            r#"{
                "development": {"database": "myapp_development", "username": "rails"},
                "test": {"database": "myapp_test", "port": 1434}
            }"#,
        )
        .unwrap();

        let file = ConfigFile::load(&path).unwrap();
        let test = file.config_for("test").unwrap();
        assert_eq!(test.database, "myapp_test");
        assert_eq!(test.port, 1434);
        assert_eq!(
            file.config_for("development").unwrap().username.as_deref(),
            Some("rails")
        );
        assert!(matches!(
            file.config_for("production"),
            Err(ConfigError::EnvironmentNotFound(e)) if e == "production"
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigFile::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
