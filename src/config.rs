//! Configuration loading and management.
//!
//! Lookup order: an explicit path, `./nested-todo/config.yaml`, then
//! `<user config dir>/nested-todo/config.yaml`, falling back to defaults.
//! Environment variables are applied on top of whichever file was used:
//!
//! - `NESTED_TODO_DB_PATH` - Database path (`none` disables the store)
//! - `NESTED_TODO_HOST` - Bind address
//! - `NESTED_TODO_PORT` - Listen port
//! - `NESTED_TODO_SESSION_SECRET` - Token signing secret

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project-local config directory name.
pub const PROJECT_DIR: &str = "nested-todo";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file. `null` runs without a store:
    /// reads return empty results and writes fail.
    #[serde(default = "default_db_path")]
    pub db_path: Option<PathBuf>,

    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_db_path() -> Option<PathBuf> {
    Some(PathBuf::from("nested-todo/todo.db"))
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Session and account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Cookie carrying the session token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session lifetime in days.
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,

    /// HMAC secret for session tokens. A random one is generated at
    /// startup when unset, so sessions do not survive restarts.
    #[serde(default)]
    pub session_secret: Option<String>,

    /// Add the `Secure` attribute to the session cookie.
    #[serde(default)]
    pub secure_cookies: bool,

    /// Username that is given the admin role when it registers.
    #[serde(default)]
    pub admin_username: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_ttl_days: default_session_ttl_days(),
            session_secret: None,
            secure_cookies: false,
            admin_username: None,
        }
    }
}

fn default_cookie_name() -> String {
    "app_session_id".to_string()
}

fn default_session_ttl_days() -> i64 {
    365
}

impl AuthConfig {
    /// Session lifetime in milliseconds. Negative lifetimes count as zero
    /// and oversized ones saturate.
    pub fn session_ttl_ms(&self) -> i64 {
        const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
        self.session_ttl_days.max(0).saturating_mul(MS_PER_DAY)
    }
}

/// Input length bounds enforced by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    #[serde(default = "default_max_list_name_len")]
    pub max_list_name_len: usize,

    #[serde(default = "default_min_username_len")]
    pub min_username_len: usize,

    #[serde(default = "default_max_username_len")]
    pub max_username_len: usize,

    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_title_len: default_max_title_len(),
            max_list_name_len: default_max_list_name_len(),
            min_username_len: default_min_username_len(),
            max_username_len: default_max_username_len(),
            min_password_len: default_min_password_len(),
        }
    }
}

fn default_max_title_len() -> usize {
    255
}

fn default_max_list_name_len() -> usize {
    255
}

fn default_min_username_len() -> usize {
    3
}

fn default_max_username_len() -> usize {
    64
}

fn default_min_password_len() -> usize {
    6
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files in lookup order.
    pub fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(PROJECT_DIR).join("config.yaml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(PROJECT_DIR).join("config.yaml"));
        }
        paths
    }

    /// Load from `explicit` if given, else the first existing default
    /// location, else defaults. Environment overrides are applied last.
    ///
    /// Returns the config and the file it came from, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let (mut config, source) = match explicit {
            Some(path) => (Self::load(path)?, Some(path.to_path_buf())),
            None => {
                let found = Self::default_locations().into_iter().find(|p| p.exists());
                match found {
                    Some(path) => (Self::load(&path)?, Some(path)),
                    None => (Self::default(), None),
                }
            }
        };
        if let Some(ref path) = source {
            debug!(path = %path.display(), "Loaded config file");
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok((config, source))
    }

    /// Apply `NESTED_TODO_*` overrides using the given variable lookup.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = var("NESTED_TODO_DB_PATH") {
            self.server.db_path = match db_path.as_str() {
                "" | "none" => None,
                path => Some(PathBuf::from(path)),
            };
        }

        if let Some(host) = var("NESTED_TODO_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("NESTED_TODO_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid NESTED_TODO_PORT"),
            }
        }

        if let Some(secret) = var("NESTED_TODO_SESSION_SECRET") {
            self.auth.session_secret = Some(secret);
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.as_deref().and_then(Path::parent)
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.limits.max_title_len, 255);
        assert_eq!(config.limits.min_username_len, 3);
        assert_eq!(config.limits.max_username_len, 64);
        assert_eq!(config.limits.min_password_len, 6);
        assert_eq!(config.auth.cookie_name, "app_session_id");
        assert_eq!(config.auth.session_ttl_ms(), 365 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn session_ttl_saturates() {
        let mut auth = AuthConfig::default();
        auth.session_ttl_days = i64::MAX;
        assert_eq!(auth.session_ttl_ms(), i64::MAX);
        auth.session_ttl_days = -5;
        assert_eq!(auth.session_ttl_ms(), 0);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "server:\n  port: 8080\nlimits:\n  max_title_len: 100\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.limits.max_title_len, 100);
        assert_eq!(config.limits.max_list_name_len, 255);
    }

    #[test]
    fn null_db_path_disables_store() {
        let config: Config = serde_yaml::from_str("server:\n  db_path: null\n").unwrap();
        assert!(config.server.db_path.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("NESTED_TODO_DB_PATH", "none"),
            ("NESTED_TODO_PORT", "9999"),
            ("NESTED_TODO_SESSION_SECRET", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.server.db_path.is_none());
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.auth.session_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| (key == "NESTED_TODO_PORT").then(|| "abc".to_string()));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "auth:\n  admin_username: root\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.auth.admin_username.as_deref(), Some("root"));
    }

    #[test]
    fn ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.db_path = Some(dir.path().join("nested").join("todo.db"));

        config.ensure_db_dir().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
