//! Upgrader settings
//!
//! [`MigrationConfig::load`] reads the `[migrations]` section of
//! `config/config.toml` (optional) and lets environment variables such as
//! `TIDEMARK__MIGRATIONS__LOCK_TIMEOUT_SECONDS=120` override it. A missing
//! section yields [`MigrationConfig::default`].

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const CONFIG_FILE: &str = "config/config.toml";
const SECTION: &str = "migrations";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationConfig {
    /// How long to wait for another process's migration lock
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
    /// Render and capture SQL without executing it or persisting state
    #[serde(default)]
    pub dry_run: bool,
    /// Ping the database before planning; failures report `NotReady`
    #[serde(default = "default_true")]
    pub preflight_check: bool,
    /// Wrap each step and its state write in a transaction where DDL is transactional
    #[serde(default = "default_true")]
    pub transactional_steps: bool,
    #[serde(default = "default_state_table")]
    pub state_table: String,
    #[serde(default = "default_lock_table")]
    pub lock_table: String,
}

fn default_lock_timeout_seconds() -> u64 {
    60
}

fn default_lock_poll_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_state_table() -> String {
    "tidemark_state".to_string()
}

fn default_lock_table() -> String {
    "tidemark_lock".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: default_lock_timeout_seconds(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            dry_run: false,
            preflight_check: true,
            transactional_steps: true,
            state_table: default_state_table(),
            lock_table: default_lock_table(),
        }
    }
}

impl MigrationConfig {
    /// Load from `config/config.toml` and `TIDEMARK__*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from the given TOML file (if present) plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = match Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source())
            .build()
        {
            Ok(settings) => settings,
            Err(err) => {
                if path.exists() {
                    log::warn!(
                        "Failed to load {}, falling back to environment: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder().add_source(env_source()).build().map_err(|env_err| {
                    ConfigError::Message(format!(
                        "Failed to load configuration from file and env: {}, then env-only error: {}",
                        err, env_err
                    ))
                })?
            }
        };

        match settings.get::<MigrationConfig>(SECTION) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Migration configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms.max(1))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_seconds = timeout.as_secs();
        self
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("TIDEMARK")
        .prefix_separator("__")
        .separator("__")
}
