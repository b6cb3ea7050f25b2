//! Configuration file at `~/.gatorconfig.json`.
//!
//! Holds the database location and the name of the logged-in user, which is
//! how the current user survives between command invocations. A missing file
//! yields `Config::default()`; the file is rewritten on `login`/`register`.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::DEFAULT_FETCH_TIMEOUT;

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("HOME environment variable not set")]
    NoHome,

    #[error("Config file has no db_url")]
    MissingDbUrl,

    #[error("Not logged in. Run `gator register <name>` or `gator login <name>` first")]
    NotLoggedIn,

    #[error("Invalid interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Persisted configuration.
///
/// Missing keys fall back to defaults, so an empty `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path or `sqlite:` URL
    pub db_url: String,

    /// Name of the logged-in user, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Upper bound on one feed fetch, in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let db_url = home_dir()
            .map(|home| home.join(".config").join("gator").join("gator.db"))
            .unwrap_or_else(|_| PathBuf::from("gator.db"));
        Self {
            db_url: db_url.to_string_lossy().into_owned(),
            current_user_name: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHome)
}

/// Default config location: `$HOME/.gatorconfig.json`
pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(CONFIG_FILE_NAME))
}

impl Config {
    const KNOWN_KEYS: [&'static str; 3] = ["db_url", "current_user_name", "fetch_timeout_secs"];

    /// Load configuration from a JSON file.
    ///
    /// - Missing or blank file → `Ok(Config::default())`
    /// - Invalid JSON → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as a warning
    /// - Empty `db_url` → `Err(ConfigError::MissingDbUrl)`
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let parse_err = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let raw: serde_json::Value = serde_json::from_str(&content).map_err(parse_err)?;
        if let Some(object) = raw.as_object() {
            for key in object.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = serde_json::from_value(raw).map_err(parse_err)?;
        if config.db_url.trim().is_empty() {
            return Err(ConfigError::MissingDbUrl);
        }

        tracing::debug!(
            path = %path.display(),
            db_url = %config.db_url,
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Name of the logged-in user, or `ConfigError::NotLoggedIn`.
    pub fn current_user(&self) -> Result<&str, ConfigError> {
        self.current_user_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::NotLoggedIn)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Set the logged-in user and write the config back to `path`.
    pub fn set_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.write(path)
    }

    /// Write the config as pretty JSON, atomically.
    ///
    /// The content goes to a uniquely named temp file beside `path`, is
    /// synced, then renamed over `path`, so a crash never leaves a partial
    /// config behind.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut data = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        data.push(b'\n');

        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

        let result = (|| {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp_file.write_all(&data)?;
            temp_file.sync_all()?;
            drop(temp_file);

            // Windows refuses to rename over an existing file
            #[cfg(windows)]
            if path.exists() {
                std::fs::remove_file(path)?;
            }

            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_err(e));
        }

        tracing::debug!(path = %path.display(), "Wrote configuration");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gator_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.db_url.ends_with("gator.db"));
        assert!(config.current_user_name.is_none());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gator_test_nonexistent_config.json");
        let config = Config::read(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_blank_file_returns_default() {
        let dir = test_dir("blank");
        let path = dir.join("config.json");
        std::fs::write(&path, "  \n ").unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = test_dir("full");
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"db_url": "/var/lib/gator.db", "current_user_name": "kahya", "fetch_timeout_secs": 5}"#,
        )
        .unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config.db_url, "/var/lib/gator.db");
        assert_eq!(config.current_user().unwrap(), "kahya");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = test_dir("partial");
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"db_url": "gator.db", "extra": true}"#).unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config.db_url, "gator.db");
        assert!(config.current_user_name.is_none());
        assert_eq!(config.fetch_timeout_secs, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_json_returns_error() {
        let dir = test_dir("invalid");
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::read(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("Invalid JSON"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_db_url_rejected() {
        let dir = test_dir("empty_db_url");
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"db_url": ""}"#).unwrap();

        let err = Config::read(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDbUrl));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_not_logged_in() {
        let config = Config::default();
        assert!(matches!(
            config.current_user(),
            Err(ConfigError::NotLoggedIn)
        ));
    }

    #[test]
    fn test_set_user_persists() {
        let dir = test_dir("set_user");
        let path = dir.join("config.json");
        let mut config = Config {
            db_url: "gator.db".to_string(),
            ..Config::default()
        };

        config.set_user("alice", &path).unwrap();
        let reloaded = Config::read(&path).unwrap();
        assert_eq!(reloaded.current_user().unwrap(), "alice");
        assert_eq!(reloaded.db_url, "gator.db");

        config.set_user("bob", &path).unwrap();
        let reloaded = Config::read(&path).unwrap();
        assert_eq!(reloaded.current_user().unwrap(), "bob");

        // No temp files left behind
        let leftovers = std::fs::read_dir(&dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().contains("tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
