//! TOML-based engine configuration.
//!
//! Stores:
//! - Global escalation timing (check-in frequency, escalation step)
//! - Per-user timing overrides supplied by the profile layer
//! - Sweep loop interval
//! - Engine behavior switches (pre-registration, implicit check-in)
//!
//! Configuration is stored at `~/.config/pulsecheck/config.toml`. The
//! engine treats it as read-only input; it never writes settings back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::policy::PolicyConfig;

/// Per-user overrides of the global escalation timing. Absent fields fall
/// back to the global values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserOverride {
    #[serde(default)]
    pub check_in_frequency_min: Option<i64>,
    #[serde(default)]
    pub escalation_step_min: Option<i64>,
}

/// Sweep loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Engine behavior switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When true, a check-in for an unknown user fails with NotFound
    /// instead of lazily creating the status record.
    #[serde(default)]
    pub require_registration: bool,
    /// When true, every conversation activity also counts as a wellbeing
    /// confirmation and resets the alert clock. Off by default: the
    /// conversation layer confirms explicitly via a check-in.
    #[serde(default)]
    pub conversation_implies_check_in: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/pulsecheck/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Per-user timing overrides, keyed by user id.
    #[serde(default)]
    pub users: HashMap<String, UserOverride>,
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/pulsecheck"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, creating the file with defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Config::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, falling back to defaults on any failure.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Effective escalation timing for one user: global values with any
    /// per-user override applied.
    pub fn policy_for(&self, user_id: &str) -> PolicyConfig {
        let mut policy = self.policy;
        if let Some(over) = self.users.get(user_id) {
            if let Some(freq) = over.check_in_frequency_min {
                policy.check_in_frequency_min = freq;
            }
            if let Some(step) = over.escalation_step_min {
                policy.escalation_step_min = step;
            }
        }
        policy
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist. Only keys that already exist
    /// can be set.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.save()
    }
}

fn get_json_value_by_path<'a>(
    root: &'a serde_json::Value,
    key: &str,
) -> Option<&'a serde_json::Value> {
    if key.is_empty() {
        return None;
    }
    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn set_json_value_by_path(
    root: &mut serde_json::Value,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let mut parts = key.split('.').peekable();
    if parts.peek().is_none() {
        return Err(ConfigError::UnknownKey(key.to_string()));
    }

    let mut current = root;
    while let Some(part) = parts.next() {
        let is_leaf = parts.peek().is_none();
        let obj = current
            .as_object_mut()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        if is_leaf {
            let existing = obj
                .get(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("cannot parse '{value}' as bool"),
                    })?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value.parse::<i64>().map(Into::into).map_err(|_| {
                        ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: format!("cannot parse '{value}' as number"),
                        }
                    })?,
                ),
                serde_json::Value::String(_) => serde_json::Value::String(value.to_string()),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: "only scalar keys can be set".to_string(),
                    })
                }
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }
        current = obj
            .get_mut(part)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    }
    Ok(())
}
