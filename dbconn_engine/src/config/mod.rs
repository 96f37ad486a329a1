//! Connection strings and driver-level settings.

use crate::engine::CursorMode;
use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

pub const AUTOCOMMIT_ENV: &str = "DBCONN_AUTOCOMMIT";
pub const MAX_CONNECTIONS_ENV: &str = "DBCONN_MAX_CONNECTIONS";
const DEFAULT_AUTOCOMMIT: bool = true;

pub(crate) fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Splits on `;` outside braces.
pub(crate) fn split_connection_string_parts(connection_string: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut brace_depth = 0u32;

    for (idx, ch) in connection_string.char_indices() {
        match ch {
            '{' => brace_depth = brace_depth.saturating_add(1),
            '}' => brace_depth = brace_depth.saturating_sub(1),
            ';' if brace_depth == 0 => {
                parts.push(&connection_string[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&connection_string[start..]);
    parts
}

fn unbrace(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value)
}

/// Keys consumed here and never forwarded to a native driver manager.
fn is_engine_option(key: &str) -> bool {
    matches!(
        key,
        "autocommit" | "readonly" | "read_only" | "mode" | "create" | "vfs" | "uri" | "busy_timeout"
            | "max_connections"
    )
}

fn read_env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|value| parse_bool_flag(&value))
}

fn read_env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn resolve<T>(conn_override: Option<T>, env_override: Option<T>, default: T) -> T {
    conn_override.or(env_override).unwrap_or(default)
}

/// A parsed `key=value;...` connection string.
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub driver: Option<String>,
    pub database: Option<String>,
    pub server: Option<String>,
    pub user: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub app_name: Option<String>,
    pub autocommit: bool,
    pub read_only: bool,
    pub create: bool,
    pub vfs: Option<String>,
    pub uri: bool,
    pub busy_timeout: Option<Duration>,
    pub max_connections: Option<usize>,
    /// Unrecognised pairs, original key spelling kept.
    pub extra: Vec<(String, String)>,
    native: Zeroizing<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("database", &self.database)
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("autocommit", &self.autocommit)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    pub fn parse(connection_string: &str) -> Result<Self> {
        if connection_string.trim().is_empty() {
            return Err(DbError::Config("Empty connection string".to_string()));
        }

        let mut config = ConnectionConfig {
            create: true,
            ..Default::default()
        };
        let mut autocommit_override = None;
        let mut native_parts = Vec::new();

        for part in split_connection_string_parts(connection_string) {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((raw_key, raw_value)) = trimmed.split_once('=') else {
                return Err(DbError::Config(format!(
                    "Malformed connection string part '{}'",
                    trimmed
                )));
            };
            let key = raw_key.trim().to_ascii_lowercase();
            let value = unbrace(raw_value);

            if !is_engine_option(&key) {
                native_parts.push(trimmed);
            }

            match key.as_str() {
                "driver" => config.driver = Some(value.to_string()),
                "database" | "dbname" | "data source" | "file" => {
                    config.database = Some(value.to_string())
                }
                "server" | "host" => config.server = Some(value.to_string()),
                "uid" | "user" => config.user = Some(value.to_string()),
                "pwd" | "password" => config.password = Some(Zeroizing::new(value.to_string())),
                "app" | "appname" => config.app_name = Some(value.to_string()),
                "autocommit" => {
                    autocommit_override = Some(flag(&key, value)?);
                }
                "readonly" | "read_only" => config.read_only = flag(&key, value)?,
                "mode" => config.read_only = value.eq_ignore_ascii_case("ro"),
                "create" => config.create = flag(&key, value)?,
                "vfs" => config.vfs = Some(value.to_string()),
                "uri" => config.uri = flag(&key, value)?,
                "busy_timeout" => {
                    let millis: u64 = value.parse().map_err(|_| {
                        DbError::Config(format!("busy_timeout must be milliseconds, got '{}'", value))
                    })?;
                    config.busy_timeout = Some(Duration::from_millis(millis));
                }
                "max_connections" => {
                    config.max_connections = Some(value.parse().map_err(|_| {
                        DbError::Config(format!("max_connections must be a number, got '{}'", value))
                    })?);
                }
                _ => config
                    .extra
                    .push((raw_key.trim().to_string(), value.to_string())),
            }
        }

        config.autocommit = resolve(
            autocommit_override,
            read_env_flag(AUTOCOMMIT_ENV),
            DEFAULT_AUTOCOMMIT,
        );
        config.native = Zeroizing::new(native_parts.join(";"));
        Ok(config)
    }

    /// The pairs meant for the native driver manager, engine options removed.
    pub fn native_connection_string(&self) -> &str {
        &self.native
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Connection string with the password masked, for logs.
    pub fn masked(&self) -> String {
        split_connection_string_parts(&self.native)
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, _))
                    if matches!(key.trim().to_ascii_lowercase().as_str(), "pwd" | "password") =>
                {
                    format!("{}=***", key.trim())
                }
                _ => part.trim().to_string(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn flag(key: &str, value: &str) -> Result<bool> {
    parse_bool_flag(value)
        .ok_or_else(|| DbError::Config(format!("'{}' expects a boolean, got '{}'", key, value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateTimeZone {
    #[default]
    #[serde(rename = "UTC", alias = "utc")]
    Utc,
}

/// Settings shared by every connection a driver opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 0 means unlimited.
    pub max_connections: usize,
    pub log_statements: bool,
    pub default_cursor: CursorMode,
    pub datetime_zone: DateTimeZone,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 0,
            log_statements: false,
            default_cursor: CursorMode::ForwardOnly,
            datetime_zone: DateTimeZone::Utc,
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults with `DBCONN_MAX_CONNECTIONS` applied.
    pub fn from_env() -> Self {
        Self {
            max_connections: resolve(None, read_env_usize(MAX_CONNECTIONS_ENV), 0),
            ..Self::default()
        }
    }

    /// Connection string first, then environment, then this config.
    pub fn effective_max_connections(&self, connection: &ConnectionConfig) -> usize {
        resolve(
            connection.max_connections,
            read_env_usize(MAX_CONNECTIONS_ENV),
            self.max_connections,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_bool_flag() {
        assert_eq!(parse_bool_flag(" YES "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn test_split_keeps_semicolon_inside_braces() {
        let parts = split_connection_string_parts("PWD={ab;c};DSN=Main");
        assert_eq!(parts, vec!["PWD={ab;c}", "DSN=Main"]);
    }

    #[test]
    #[serial]
    fn test_parse_sqlite_string() {
        std::env::remove_var(AUTOCOMMIT_ENV);
        let config =
            ConnectionConfig::parse("Driver=sqlite;Database=/tmp/x.db;ReadOnly=1;busy_timeout=250")
                .unwrap();
        assert_eq!(config.driver.as_deref(), Some("sqlite"));
        assert_eq!(config.database.as_deref(), Some("/tmp/x.db"));
        assert!(config.read_only);
        assert!(config.autocommit);
        assert_eq!(config.busy_timeout, Some(Duration::from_millis(250)));
        assert_eq!(
            config.native_connection_string(),
            "Driver=sqlite;Database=/tmp/x.db"
        );
    }

    #[test]
    #[serial]
    fn test_parse_sybase_string_keeps_password_out_of_logs() {
        let config = ConnectionConfig::parse(
            "Driver={Adaptive Server Enterprise};Server=db1;Port=5000;UID=sa;PWD={p;w};AutoCommit=off",
        )
        .unwrap();
        assert_eq!(config.server.as_deref(), Some("db1"));
        assert_eq!(config.user.as_deref(), Some("sa"));
        assert_eq!(config.password.as_deref().map(String::as_str), Some("p;w"));
        assert_eq!(config.extra("port"), Some("5000"));
        assert!(!config.autocommit);
        assert!(!config.masked().contains("p;w"));
        assert!(config.masked().contains("PWD=***"));
        assert!(!format!("{:?}", config).contains("p;w"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(ConnectionConfig::parse(""), Err(DbError::Config(_))));
        assert!(ConnectionConfig::parse("Database=x;novalue").is_err());
        assert!(ConnectionConfig::parse("ReadOnly=perhaps").is_err());
    }

    #[test]
    #[serial]
    fn test_autocommit_env_override() {
        std::env::set_var(AUTOCOMMIT_ENV, "0");
        let from_env = ConnectionConfig::parse("Database=:memory:").unwrap();
        let from_conn = ConnectionConfig::parse("Database=:memory:;AutoCommit=yes").unwrap();
        std::env::remove_var(AUTOCOMMIT_ENV);
        assert!(!from_env.autocommit);
        assert!(from_conn.autocommit);
    }

    #[test]
    #[serial]
    fn test_max_connections_resolution() {
        let driver = DriverConfig {
            max_connections: 4,
            ..Default::default()
        };
        std::env::remove_var(MAX_CONNECTIONS_ENV);
        let plain = ConnectionConfig::parse("Database=:memory:").unwrap();
        assert_eq!(driver.effective_max_connections(&plain), 4);

        std::env::set_var(MAX_CONNECTIONS_ENV, "2");
        assert_eq!(driver.effective_max_connections(&plain), 2);
        let explicit = ConnectionConfig::parse("Database=:memory:;max_connections=9").unwrap();
        assert_eq!(driver.effective_max_connections(&explicit), 9);
        std::env::remove_var(MAX_CONNECTIONS_ENV);
    }

    #[test]
    fn test_driver_config_from_json() {
        let config = DriverConfig::from_json(
            r#"{"max_connections": 3, "default_cursor": "scrollable", "datetime_zone": "UTC"}"#,
        )
        .unwrap();
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.default_cursor, CursorMode::Scrollable);
        assert!(!config.log_statements);
        assert!(matches!(
            DriverConfig::from_json("{\"max_connections\": \"many\"}"),
            Err(DbError::Config(_))
        ));
    }
}
