//! Connection configuration.
//!
//! Settings come from a JSON file (`schemata.json` by default) and can be
//! overridden per field by environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DBHN`   | host |
//! | `DBPORT` | port |
//! | `DBUN`   | user |
//! | `DBPWD`  | password |
//! | `DBDB`   | database |
//!
//! A full `DATABASE_URL` (or `--database-url`) takes precedence over both.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;

use crate::connection::MySqlConnector;
use crate::error::{MigrateError, Result};

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "schemata.json";

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Environment variable overriding the host.
pub const ENV_HOST: &str = "DBHN";
/// Environment variable overriding the port.
pub const ENV_PORT: &str = "DBPORT";
/// Environment variable overriding the user.
pub const ENV_USER: &str = "DBUN";
/// Environment variable overriding the password.
pub const ENV_PASSWORD: &str = "DBPWD";
/// Environment variable overriding the database name.
pub const ENV_DATABASE: &str = "DBDB";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// MySQL connection settings.
    #[serde(default)]
    pub mysql: MySqlConfig,
}

/// MySQL connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MySqlConfig {
    /// Database host (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    #[serde(default)]
    pub database: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

impl Config {
    /// The file written by `init-config`.
    #[must_use]
    pub fn template() -> Self {
        Self {
            mysql: MySqlConfig {
                user: "root".to_string(),
                database: "app".to_string(),
                ..MySqlConfig::default()
            },
        }
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MigrateError::Config(e.to_string()))
    }

    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| MigrateError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("{}: {e}", path.display())))
    }

    /// Loads the file if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Applies `DBHN`/`DBPORT`/`DBUN`/`DBPWD`/`DBDB` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.mysql.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.mysql.port = port
                .trim()
                .parse()
                .map_err(|_| MigrateError::Config(format!("{ENV_PORT}='{port}' is not a port")))?;
        }
        if let Some(user) = get(ENV_USER) {
            self.mysql.user = user;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.mysql.password = password;
        }
        if let Some(database) = get(ENV_DATABASE) {
            self.mysql.database = database;
        }
        Ok(self)
    }

    /// Writes the configuration; refuses to overwrite unless `force`.
    pub fn write(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(MigrateError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }

    /// Connection options; fails when user or database is not set.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let mysql = &self.mysql;
        if mysql.user.is_empty() || mysql.database.is_empty() {
            return Err(MigrateError::MissingDatabaseUrl);
        }
        let mut options = MySqlConnectOptions::new()
            .host(&mysql.host)
            .port(mysql.port)
            .username(&mysql.user)
            .database(&mysql.database);
        if !mysql.password.is_empty() {
            options = options.password(&mysql.password);
        }
        Ok(options)
    }
}

/// Builds a connector: an explicit URL wins, then the config file with
/// environment overrides.
pub fn resolve_connector(database_url: Option<&str>, config_path: &Path) -> Result<MySqlConnector> {
    if let Some(url) = database_url.filter(|u| !u.is_empty()) {
        return MySqlConnector::from_url(url);
    }
    let config = Config::load_or_default(config_path)?.with_env_overrides()?;
    Ok(MySqlConnector::new(config.connect_options()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_json(r#"{ "mysql": { "user": "app", "database": "shop" } }"#)
            .unwrap();
        assert_eq!(config.mysql.host, "localhost");
        assert_eq!(config.mysql.port, DEFAULT_PORT);
        assert_eq!(config.mysql.user, "app");
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_HOST, "db.internal"),
            (ENV_PORT, "3307"),
            (ENV_PASSWORD, "s3cr#t@"),
            (ENV_DATABASE, ""),
        ]
        .into_iter()
        .collect();

        let config = Config::template()
            .with_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.mysql.host, "db.internal");
        assert_eq!(config.mysql.port, 3307);
        assert_eq!(config.mysql.password, "s3cr#t@");
        // Empty values do not override.
        assert_eq!(config.mysql.database, "app");
    }

    #[test]
    fn test_bad_port_override() {
        let err = Config::default()
            .with_overrides(|key| (key == ENV_PORT).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_missing_settings() {
        assert!(matches!(
            Config::default().connect_options(),
            Err(MigrateError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = Config::template();
        config.mysql.password = "super_secret_password_123".to_string();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        Config::template().write(&path, false).unwrap();
        assert!(matches!(
            Config::template().write(&path, false),
            Err(MigrateError::Config(_))
        ));
        Config::template().write(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::template());
    }

    #[test]
    fn test_explicit_url_wins() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            resolve_connector(Some("mysql://u:p@localhost/db"), &dir.path().join("none.json"));
        assert!(connector.is_ok());
    }
}
