//! # Engine Configuration
//!
//! Configuration management for the issuance engine and the sweeper.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FACTURO_DB_PATH=/var/lib/facturo/facturo.db                        │
//! │     FACTURO_AUTHORITY_BEHAVIOR=accept_after_polls:2                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/facturo/facturo.toml (Linux)                             │
//! │     ~/Library/Application Support/pe.facturo.facturo/facturo.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/facturo/facturo.db"
//! max_connections = 5
//!
//! [submission]
//! max_poll_attempts = 5
//! poll_interval_ms = 2000
//!
//! [sweep]
//! enabled = true
//! interval_secs = 60
//! batch_size = 50
//!
//! [authority]
//! mode = "accept_after_polls"
//! polls = 2
//!
//! [issuance]
//! default_currency = "PEN"
//! submit_on_issue = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use facturo_core::validation::validate_currency;
use facturo_core::DEFAULT_CURRENCY;
use facturo_db::DbConfig;

use crate::authority::SandboxBehavior;
use crate::error::{EngineError, EngineResult};
use crate::reconciler::RetryPolicy;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how to open the SQLite database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Default: `facturo.db` in the platform data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Pool acquire timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a writer waits for the SQLite lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("pe", "facturo", "facturo")
        .map(|dirs| dirs.data_dir().join("facturo.db"))
        .unwrap_or_else(|| PathBuf::from("facturo.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Submission Settings
// =============================================================================

/// Call-time polling of the tax authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSettings {
    /// Status polls after a PENDIENTE answer. 0 disables call-time polling.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Fixed wait before each poll (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_max_poll_attempts() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    2000
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        SubmissionSettings {
            max_poll_attempts: default_max_poll_attempts(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

// =============================================================================
// Sweep Settings
// =============================================================================

/// Background re-polling of pending documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Maximum documents re-polled per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            enabled: true,
            interval_secs: default_sweep_interval(),
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Issuance Settings
// =============================================================================

/// Defaults applied to issuance requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceSettings {
    /// Currency when a request does not name one.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Submit formal documents right after issuing them.
    #[serde(default = "default_true")]
    pub submit_on_issue: bool,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        IssuanceSettings {
            default_currency: default_currency(),
            submit_on_issue: true,
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub submission: SubmissionSettings,

    #[serde(default)]
    pub sweep: SweepSettings,

    /// Behavior of the sandbox authority.
    #[serde(default)]
    pub authority: SandboxBehavior,

    #[serde(default)]
    pub issuance: IssuanceSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (facturo.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EngineError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(EngineError::Config(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.submission.max_poll_attempts > 0 && self.submission.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "submission.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            return Err(EngineError::Config(
                "sweep.interval_secs must be greater than 0".into(),
            ));
        }

        if self.sweep.batch_size == 0 {
            return Err(EngineError::Config(
                "sweep.batch_size must be greater than 0".into(),
            ));
        }

        validate_currency(&self.issuance.default_currency)
            .map_err(|e| EngineError::Config(format!("issuance.default_currency: {}", e)))?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    ///
    /// Unparseable values are logged and ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("FACTURO_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(attempts) = var("FACTURO_MAX_POLL_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.submission.max_poll_attempts = n,
                Err(_) => warn!(value = %attempts, "Invalid FACTURO_MAX_POLL_ATTEMPTS"),
            }
        }

        if let Some(interval) = var("FACTURO_POLL_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.submission.poll_interval_ms = ms,
                Err(_) => warn!(value = %interval, "Invalid FACTURO_POLL_INTERVAL_MS"),
            }
        }

        if let Some(interval) = var("FACTURO_SWEEP_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.sweep.interval_secs = secs,
                Err(_) => warn!(value = %interval, "Invalid FACTURO_SWEEP_INTERVAL_SECS"),
            }
        }

        if let Some(size) = var("FACTURO_SWEEP_BATCH_SIZE") {
            match size.parse::<u32>() {
                Ok(n) => self.sweep.batch_size = n,
                Err(_) => warn!(value = %size, "Invalid FACTURO_SWEEP_BATCH_SIZE"),
            }
        }

        if let Some(behavior) = var("FACTURO_AUTHORITY_BEHAVIOR") {
            match behavior.parse() {
                Ok(parsed) => {
                    debug!(behavior = %behavior, "Overriding authority behavior from environment");
                    self.authority = parsed;
                }
                Err(e) => warn!(error = %e, "Ignoring FACTURO_AUTHORITY_BEHAVIOR"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pe", "facturo", "facturo")
            .map(|dirs| dirs.config_dir().join("facturo.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database pool configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Call-time polling policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.submission.max_poll_attempts,
            interval: Duration::from_millis(self.submission.poll_interval_ms),
        }
    }

    /// Interval of the background sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.submission.max_poll_attempts, 5);
        assert_eq!(config.sweep.batch_size, 50);
        assert_eq!(config.authority, SandboxBehavior::AcceptImmediately);
        assert_eq!(config.issuance.default_currency, "PEN");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.sweep.batch_size = 0;
        assert!(config.validate().is_err());
        config.sweep.batch_size = 10;

        config.submission.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.submission.max_poll_attempts = 0;
        assert!(config.validate().is_ok());

        config.issuance.default_currency = "soles".into();
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_toml_sections() {
        let config: EngineConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/facturo-test.db"

            [submission]
            max_poll_attempts = 3

            [authority]
            mode = "reject"
            reason = "RUC no habido"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/facturo-test.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.submission.max_poll_attempts, 3);
        assert_eq!(config.submission.poll_interval_ms, 2000);
        assert_eq!(
            config.authority,
            SandboxBehavior::Reject {
                reason: "RUC no habido".into()
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FACTURO_DB_PATH", "/data/f.db"),
            ("FACTURO_MAX_POLL_ATTEMPTS", "2"),
            ("FACTURO_POLL_INTERVAL_MS", "not-a-number"),
            ("FACTURO_AUTHORITY_BEHAVIOR", "accept_after_polls:4"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/f.db"));
        assert_eq!(config.submission.max_poll_attempts, 2);
        assert_eq!(config.submission.poll_interval_ms, 2000);
        assert_eq!(config.authority, SandboxBehavior::AcceptAfterPolls { polls: 4 });
    }

    #[test]
    fn test_derived_settings() {
        let mut config = EngineConfig::default();
        config.submission.poll_interval_ms = 250;
        config.database.busy_timeout_ms = 1500;

        let policy = config.retry_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 5);

        let db = config.db_config();
        assert_eq!(db.busy_timeout, Duration::from_millis(1500));
        assert_eq!(db.max_connections, 5);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sweep]"));
    }
}
