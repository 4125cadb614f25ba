//! Engine configuration.
//!
//! Layered: hard-coded defaults, then an optional TOML file at
//! `~/.config/interpool/config.toml`, then environment variables. The
//! resulting config seeds the policy row on first start and derives the
//! engine's runtime options.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;
use crate::error::ConfigError;
use crate::policy::{AssignMode, AssignmentPolicy, Weights};
use crate::store::data_dir;

/// Engine configuration.
///
/// Serialized to/from TOML; every field also answers to an environment
/// variable of the same upper-snake name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub auto_assign_enabled: bool,
    #[serde(default = "default_mode")]
    pub assign_mode: AssignMode,
    #[serde(default = "default_window_days")]
    pub fairness_window_days: i64,
    #[serde(default = "default_max_gap")]
    pub max_gap_hours: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_seconds: i64,
    #[serde(default = "default_policy_cache")]
    pub policy_cache_seconds: i64,
    /// Count waiting bookings as hard conflicts.
    #[serde(default)]
    pub include_waiting_conflicts: bool,
}

fn default_true() -> bool {
    true
}
fn default_mode() -> AssignMode {
    AssignMode::Normal
}
fn default_window_days() -> i64 {
    14
}
fn default_max_gap() -> f64 {
    10.0
}
fn default_batch_size() -> usize {
    10
}
fn default_lease_timeout() -> i64 {
    60
}
fn default_policy_cache() -> i64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_assign_enabled: true,
            assign_mode: AssignMode::Normal,
            fairness_window_days: 14,
            max_gap_hours: 10.0,
            batch_size: 10,
            lease_timeout_seconds: 60,
            policy_cache_seconds: 300,
            include_waiting_conflicts: false,
        }
    }
}

impl EngineConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/interpool"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Defaults, then the config file (if present), then the environment.
    ///
    /// # Errors
    /// Returns an error if the config file or an environment variable
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::path() {
            Ok(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("AUTO_ASSIGN_ENABLED") {
            self.auto_assign_enabled = parse_bool("AUTO_ASSIGN_ENABLED", &v)?;
        }
        if let Some(v) = env_var("ASSIGN_MODE") {
            self.assign_mode = AssignMode::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: "ASSIGN_MODE".to_string(),
                message: format!("unknown mode '{v}'"),
            })?;
        }
        if let Some(v) = env_var("FAIRNESS_WINDOW_DAYS") {
            self.fairness_window_days = parse_num("FAIRNESS_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = env_var("MAX_GAP_HOURS") {
            self.max_gap_hours = parse_num("MAX_GAP_HOURS", &v)?;
        }
        if let Some(v) = env_var("BATCH_SIZE") {
            self.batch_size = parse_num("BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_var("LEASE_TIMEOUT_SECONDS") {
            self.lease_timeout_seconds = parse_num("LEASE_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = env_var("POLICY_CACHE_SECONDS") {
            self.policy_cache_seconds = parse_num("POLICY_CACHE_SECONDS", &v)?;
        }
        Ok(())
    }

    /// Seed policy for a fresh store, sanitised to valid ranges.
    pub fn seed_policy(&self) -> AssignmentPolicy {
        let mut policy = AssignmentPolicy {
            mode: self.assign_mode,
            auto_assign_enabled: self.auto_assign_enabled,
            fairness_window_days: self.fairness_window_days,
            max_gap_hours: self.max_gap_hours,
            weights: Weights::locked_for(self.assign_mode).unwrap_or_default(),
            ..AssignmentPolicy::default()
        };
        policy.sanitise();
        policy
    }

    /// Runtime options for [`crate::engine::Engine`].
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            include_waiting_conflicts: self.include_waiting_conflicts,
            batch_size: self.batch_size.max(1),
            lease_timeout: chrono::Duration::seconds(self.lease_timeout_seconds.max(1)),
            policy_cache: chrono::Duration::seconds(self.policy_cache_seconds.max(0)),
            ..EngineOptions::default()
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a number, got '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.auto_assign_enabled);
        assert_eq!(config.assign_mode, AssignMode::Normal);
        assert_eq!(config.fairness_window_days, 14);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_toml_roundtrip_with_partial_file() {
        let toml_src = r#"
            assign_mode = "BALANCE"
            max_gap_hours = 6.5
        "#;
        let config: EngineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.assign_mode, AssignMode::Balance);
        assert_eq!(config.max_gap_hours, 6.5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.fairness_window_days, 14);
        assert!(config.auto_assign_enabled);
    }

    #[test]
    fn test_seed_policy_uses_locked_weights() {
        let config = EngineConfig {
            assign_mode: AssignMode::Balance,
            fairness_window_days: 9999,
            ..EngineConfig::default()
        };
        let policy = config.seed_policy();
        assert_eq!(policy.weights, Weights::balance());
        // Sanitised into range.
        assert_eq!(policy.fairness_window_days, 365);
    }

    #[test]
    fn test_parse_bool_values() {
        assert!(parse_bool("K", "true").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn test_engine_options_derivation() {
        let config = EngineConfig {
            batch_size: 0,
            lease_timeout_seconds: 120,
            ..EngineConfig::default()
        };
        let options = config.engine_options();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.lease_timeout, chrono::Duration::seconds(120));
    }
}
