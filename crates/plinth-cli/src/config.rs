//! Configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Where migration folders are discovered.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long to wait for a free connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    /// Directory whose subdirectories each may hold a `migrations` folder.
    #[serde(default = "default_migrations_root")]
    pub root: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "plinth_migrate=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "plinth.db".to_string()
}

fn default_pool_max_size() -> u32 {
    plinth_db::DbRuntimeSettings::default().pool_max_size
}

fn default_busy_timeout_ms() -> u64 {
    plinth_db::DbRuntimeSettings::default().busy_timeout_ms
}

fn default_acquire_timeout_ms() -> u64 {
    plinth_db::DbRuntimeSettings::default().acquire_timeout_ms
}

fn default_migrations_root() -> String {
    "src".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_max_size: default_pool_max_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> plinth_db::DbRuntimeSettings {
        plinth_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            acquire_timeout_ms: self.acquire_timeout_ms,
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            root: default_migrations_root(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist.
///
/// Environment variable overrides:
/// - `PLINTH_DB_PATH` overrides `database.path`
/// - `PLINTH_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `PLINTH_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `PLINTH_DB_ACQUIRE_TIMEOUT_MS` overrides `database.acquire_timeout_ms`
/// - `PLINTH_MIGRATIONS_ROOT` overrides `migrations.root`
/// - `PLINTH_LOG_LEVEL` overrides `logging.level`
/// - `PLINTH_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `PLINTH_*` overrides read through `var`. Unparsable numbers are
/// ignored.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("PLINTH_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(size) = var("PLINTH_DB_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }
    if let Some(timeout) = var("PLINTH_DB_BUSY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.busy_timeout_ms = parsed;
        }
    }
    if let Some(timeout) = var("PLINTH_DB_ACQUIRE_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.acquire_timeout_ms = parsed;
        }
    }
    if let Some(root) = var("PLINTH_MIGRATIONS_ROOT") {
        config.migrations.root = root;
    }
    if let Some(level) = var("PLINTH_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("PLINTH_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parses_partial_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("plinth.toml");
        std::fs::write(
            &path,
            "[database]\npath = \"data/app.db\"\npool_max_size = 2\n\n[migrations]\nroot = \"features\"\n",
        )
        .expect("write failed");

        let config = load_config(path.to_str()).expect("valid config");
        assert_eq!(config.database.path, "data/app.db");
        assert_eq!(config.database.pool_max_size, 2);
        assert_eq!(config.database.acquire_timeout_ms, 30_000);
        assert_eq!(config.migrations.root, "features");
        assert!(!config.logging.json);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("plinth.toml");
        std::fs::write(&path, "[database\npath = 1").expect("write failed");
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("PLINTH_DB_PATH", "/tmp/override.db"),
            ("PLINTH_DB_POOL_MAX_SIZE", "16"),
            ("PLINTH_DB_BUSY_TIMEOUT_MS", "not a number"),
            ("PLINTH_DB_ACQUIRE_TIMEOUT_MS", "250"),
            ("PLINTH_MIGRATIONS_ROOT", "modules"),
            ("PLINTH_LOG_LEVEL", "debug"),
            ("PLINTH_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.database.pool_max_size, 16);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.database.acquire_timeout_ms, 250);
        assert_eq!(config.migrations.root, "modules");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let settings = config.database.runtime_settings();
        assert_eq!(settings.pool_max_size, 16);
    }
}
