//! Client configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/pollsync/config.toml)
//! 3. Environment variables (POLLSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "POLLSYNC";

/// How the engine treats a pushed snapshot relative to the one it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOrdering {
    /// Every push replaces the current poll
    #[default]
    LastWriteWins,
    /// Pushes with an `updatedAt` older than the held poll are ignored
    NewestUpdatedAt,
}

impl FromStr for PushOrdering {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last_write_wins" => Ok(Self::LastWriteWins),
            "newest_updated_at" => Ok(Self::NewestUpdatedAt),
            other => anyhow::bail!(
                "Unknown push ordering '{}'. Use last_write_wins or newest_updated_at.",
                other
            ),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the client token and voted-poll record
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the REST API (`/poll` and `/poll/vote` are appended)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Request timeout for REST calls, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Push channel server origin
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Failed connection attempts before the push channel gives up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between push channel connection attempts, in milliseconds
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Pause between teardown and connect on a manual reconnect, in milliseconds
    #[serde(default = "default_manual_reconnect_delay_ms")]
    pub manual_reconnect_delay_ms: u64,

    /// Poll room announced with `join_poll` once connected
    #[serde(default = "default_poll_room")]
    pub poll_room: String,

    /// Ordering policy for pushed snapshots
    #[serde(default)]
    pub push_ordering: PushOrdering,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            ws_url: default_ws_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            manual_reconnect_delay_ms: default_manual_reconnect_delay_ms(),
            poll_room: default_poll_room(),
            push_ordering: PushOrdering::default(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (POLLSYNC_API_BASE_URL, POLLSYNC_WS_URL, ...)
    /// 2. Config file (~/.config/pollsync/config.toml or POLLSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_BASE_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_base_url = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_WS_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.ws_url = val;
            }
        }

        // Numeric overrides keep the previous value when unparseable
        override_number(&format!("{}_REQUEST_TIMEOUT", ENV_PREFIX), &mut self.request_timeout_ms);
        override_number(
            &format!("{}_WS_RECONNECT_ATTEMPTS", ENV_PREFIX),
            &mut self.reconnect_attempts,
        );
        override_number(
            &format!("{}_WS_RECONNECT_INTERVAL", ENV_PREFIX),
            &mut self.reconnect_interval_ms,
        );
    }

    /// Ensure data directory exists
    /// Identity files are written best-effort, so a missing data directory
    /// is only worth a warning
    fn ensure_data_dir(&self) {
        if self.data_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.data_dir) {
            tracing::warn!(
                "Failed to create data directory {:?}: {}",
                self.data_dir,
                e
            );
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a single value by key, as typed on the command line
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "api_base_url" => self.api_base_url = value.to_string(),
            "request_timeout_ms" => self.request_timeout_ms = parse_number(key, value)?,
            "ws_url" => self.ws_url = value.to_string(),
            "reconnect_attempts" => self.reconnect_attempts = parse_number(key, value)?,
            "reconnect_interval_ms" => self.reconnect_interval_ms = parse_number(key, value)?,
            "manual_reconnect_delay_ms" => {
                self.manual_reconnect_delay_ms = parse_number(key, value)?
            }
            "poll_room" => self.poll_room = value.to_string(),
            "push_ordering" => self.push_ordering = value.parse()?,
            "log_file" => {
                self.log_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            other => anyhow::bail!("Unknown configuration key: {}", other),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with POLLSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pollsync")
            .join("config.toml")
    }

    /// Get the path holding the anonymous client token
    pub fn user_token_path(&self) -> PathBuf {
        self.data_dir.join("userToken")
    }

    /// Get the path holding the JSON list of voted poll ids
    pub fn voted_polls_path(&self) -> PathBuf {
        self.data_dir.join("votedPolls")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn manual_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.manual_reconnect_delay_ms)
    }
}

fn override_number<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Ignoring unparseable {}={:?}", var, val),
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid number for {}: {}", key, value))
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pollsync")
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

fn default_manual_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_poll_room() -> String {
    "current".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "POLLSYNC_DATA_DIR",
        "POLLSYNC_API_BASE_URL",
        "POLLSYNC_WS_URL",
        "POLLSYNC_REQUEST_TIMEOUT",
        "POLLSYNC_WS_RECONNECT_ATTEMPTS",
        "POLLSYNC_WS_RECONNECT_INTERVAL",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(3));
        assert_eq!(config.manual_reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.poll_room, "current");
        assert_eq!(config.push_ordering, PushOrdering::LastWriteWins);
        assert!(config.data_dir.ends_with("pollsync"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.user_token_path().ends_with("userToken"));
        assert!(config.voted_polls_path().ends_with("votedPolls"));
    }

    #[test]
    fn test_env_override_urls() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("POLLSYNC_API_BASE_URL", "https://polls.example.com/api");
        env::set_var("POLLSYNC_WS_URL", "wss://polls.example.com");
        config.apply_env_overrides();

        assert_eq!(config.api_base_url, "https://polls.example.com/api");
        assert_eq!(config.ws_url, "wss://polls.example.com");

        // Empty string leaves the value alone
        env::set_var("POLLSYNC_WS_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.ws_url, "wss://polls.example.com");
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("POLLSYNC_REQUEST_TIMEOUT", "2500");
        env::set_var("POLLSYNC_WS_RECONNECT_ATTEMPTS", "9");
        env::set_var("POLLSYNC_WS_RECONNECT_INTERVAL", "abc");
        config.apply_env_overrides();

        assert_eq!(config.request_timeout_ms, 2500);
        assert_eq!(config.reconnect_attempts, 9);
        assert_eq!(config.reconnect_interval_ms, 3000);
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("POLLSYNC_DATA_DIR", "/tmp/pollsync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/pollsync-test"));
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_base_url = "http://poll.local/api"
            reconnect_attempts = 3
            push_ordering = "newest_updated_at"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_base_url, "http://poll.local/api");
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.push_ordering, PushOrdering::NewestUpdatedAt);
        // Unspecified fields fall back to defaults
        assert_eq!(config.reconnect_interval_ms, 3000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("POLLSYNC_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.reconnect_attempts, 5);
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_load_with_unusable_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        env::set_var("POLLSYNC_DATA_DIR", blocker.join("data"));

        let path = temp_dir.path().join("config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.data_dir, blocker.join("data"));
        assert!(!config.data_dir.exists());
    }

    #[test]
    fn test_serialization() {
        let config = Config {
            data_dir: PathBuf::from("/data/pollsync"),
            log_file: Some(PathBuf::from("/tmp/pollsync.log")),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("api_base_url"));
        assert!(toml_str.contains("push_ordering = \"last_write_wins\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.log_file, config.log_file);
        assert_eq!(parsed.ws_url, config.ws_url);
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("reconnect_attempts", "7").unwrap();
        config.set_value("push_ordering", "newest_updated_at").unwrap();
        config.set_value("log_file", "").unwrap();

        assert_eq!(config.reconnect_attempts, 7);
        assert_eq!(config.push_ordering, PushOrdering::NewestUpdatedAt);
        assert!(config.log_file.is_none());

        assert!(config.set_value("reconnect_attempts", "many").is_err());
        assert!(config.set_value("favorite_color", "blue").is_err());
    }
}
