//! Loading of `config.json`, the server's on-disk configuration blob.
//!
//! Mirrors the key/value fields the source reads by hand with `rapidjson`,
//! but uses `serde` so optional fields get real defaults instead of scattered
//! `HasMember` checks.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;
const DEFAULT_DB_POOL_SIZE: usize = 5;
const DEFAULT_THREAD_POOL_SIZE: usize = 5;

fn default_db_pool_size() -> usize {
    DEFAULT_DB_POOL_SIZE
}

fn default_thread_pool_size() -> usize {
    DEFAULT_THREAD_POOL_SIZE
}

fn default_thread_pool_overload() -> bool {
    true
}

fn default_max_message_len() -> u32 {
    DEFAULT_MAX_MESSAGE_LEN
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parsed contents of `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the listener binds to.
    pub ip: String,
    /// Port the listener binds to.
    pub port: u16,

    /// MySQL host.
    pub db_host: String,
    /// MySQL user.
    pub db_user: String,
    /// MySQL password.
    pub db_passwd: String,
    /// MySQL database name. Empty string means "no default database".
    #[serde(default)]
    pub db_name: String,
    /// MySQL port. `0` lets the driver pick its default.
    #[serde(default)]
    pub db_port: u16,
    /// Number of connections eagerly opened by the DB pool.
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: usize,

    /// Number of worker threads.
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,
    /// Whether the worker pool accepts tasks beyond `thread_pool_size`
    /// waiting-or-in-flight.
    #[serde(default = "default_thread_pool_overload")]
    pub thread_pool_overload: bool,

    /// Largest accepted message body, in bytes.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: u32,

    /// `log` facade level, used unless `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Reads and parses the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_fields_with_defaults() {
        let json = r#"{
            "ip": "127.0.0.1",
            "port": 9000,
            "db_host": "localhost",
            "db_user": "root",
            "db_passwd": "secret"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.ip, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_pool_size, DEFAULT_DB_POOL_SIZE);
        assert_eq!(config.thread_pool_size, DEFAULT_THREAD_POOL_SIZE);
        assert!(config.thread_pool_overload);
        assert_eq!(config.max_message_len, DEFAULT_MAX_MESSAGE_LEN);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn missing_required_field_fails() {
        let json = r#"{ "ip": "127.0.0.1", "port": 9000 }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_file_surfaces_read_error() {
        let err = Config::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_invalid_json_surfaces_parse_error() {
        let dir = std::env::temp_dir().join("packetbeam-config-test-invalid");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
