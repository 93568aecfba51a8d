//! TOML-based application configuration.
//!
//! Stores user preferences for:
//! - Rest duration and countdown tick rate
//! - Alert cadence, wake-lock ceiling, sound and vibration
//!
//! Configuration is stored at `~/.config/repcount/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::alarm::DeliveryConfig;
use crate::error::ConfigError;
use crate::session::{DEFAULT_REST_MINUTES, REST_MINUTES};

const TICK_INTERVAL_MS: std::ops::RangeInclusive<u64> = 1..=1000;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_rest_minutes")]
    pub rest_minutes: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Alarm alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_wake_ceiling_secs")]
    pub wake_ceiling_secs: u64,
    /// Path to the alert sound file (optional).
    /// Without one the terminal bell is used.
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "default_true")]
    pub vibration: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/repcount/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

fn default_rest_minutes() -> u32 {
    DEFAULT_REST_MINUTES
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_interval_secs() -> u64 {
    3
}
fn default_wake_ceiling_secs() -> u64 {
    600
}
fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rest_minutes: default_rest_minutes(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            wake_ceiling_secs: default_wake_ceiling_secs(),
            sound: None,
            vibration: true,
        }
    }
}

impl Config {
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value.parse::<u64>().map_err(|e| invalid(e.to_string()))?;
                    serde_json::Value::Number(n.into())
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ if value.is_empty() => serde_json::Value::Null,
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or create the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing the default there if missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, in memory only.
    ///
    /// An empty value clears an optional string. The whole config is
    /// validated before the change is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or is out of range.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its value, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Reject values the session would refuse at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !REST_MINUTES.contains(&self.session.rest_minutes) {
            return Err(ConfigError::InvalidValue {
                key: "session.rest_minutes".into(),
                message: format!(
                    "{} is outside {}..={}",
                    self.session.rest_minutes,
                    REST_MINUTES.start(),
                    REST_MINUTES.end()
                ),
            });
        }
        if self.alert.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alert.interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.alert.wake_ceiling_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alert.wake_ceiling_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Countdown tick period, clamped to 1..=1000 ms.
    pub fn tick_interval(&self) -> Duration {
        let ms = self
            .session
            .tick_interval_ms
            .clamp(*TICK_INTERVAL_MS.start(), *TICK_INTERVAL_MS.end());
        Duration::from_millis(ms)
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            interval: Duration::from_secs(self.alert.interval_secs.max(1)),
            wake_ceiling: Duration::from_secs(self.alert.wake_ceiling_secs),
            vibration: self.alert.vibration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.session.rest_minutes, 2);
        assert_eq!(parsed.alert.interval_secs, 3);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let parsed: Config = toml::from_str("[session]\nrest_minutes = 4\n").unwrap();
        assert_eq!(parsed.session.rest_minutes, 4);
        assert_eq!(parsed.session.tick_interval_ms, 100);
        assert_eq!(parsed.alert, AlertConfig::default());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("session.rest_minutes").as_deref(), Some("2"));
        assert_eq!(cfg.get("alert.vibration").as_deref(), Some("true"));
        assert!(cfg.get("alert.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_values() {
        let mut cfg = Config::default();
        cfg.set("session.rest_minutes", "5").unwrap();
        cfg.set("alert.vibration", "false").unwrap();
        cfg.set("alert.sound", "/tmp/gong.wav").unwrap();
        assert_eq!(cfg.session.rest_minutes, 5);
        assert!(!cfg.alert.vibration);
        assert_eq!(cfg.alert.sound.as_deref(), Some("/tmp/gong.wav"));

        cfg.set("alert.sound", "").unwrap();
        assert!(cfg.alert.sound.is_none());
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("session.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("alert.vibration", "loud"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("session.rest_minutes", "100"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("session.rest_minutes", "-1").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn zero_alert_durations_are_rejected() {
        let mut cfg = Config::default();
        let err = cfg.set("alert.wake_ceiling_secs", "0").unwrap_err();
        assert!(err.to_string().contains("alert.wake_ceiling_secs"));
        assert!(cfg.set("alert.interval_secs", "0").is_err());
        assert_eq!(cfg, Config::default());

        cfg.set("alert.wake_ceiling_secs", "1").unwrap();
        assert_eq!(cfg.delivery().wake_ceiling, Duration::from_secs(1));
    }

    #[test]
    fn tick_interval_is_clamped() {
        let mut cfg = Config::default();
        assert_eq!(cfg.tick_interval(), Duration::from_millis(100));
        cfg.session.tick_interval_ms = 0;
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
        cfg.session.tick_interval_ms = 60_000;
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn delivery_config_follows_alert_section() {
        let mut cfg = Config::default();
        assert_eq!(cfg.delivery().interval, Duration::from_secs(3));
        assert_eq!(cfg.delivery().wake_ceiling, Duration::from_secs(600));
        cfg.alert.vibration = false;
        assert!(!cfg.delivery().vibration);
    }

    #[test]
    fn load_from_creates_then_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert_eq!(created, Config::default());
        assert!(path.exists());

        let mut cfg = created;
        cfg.set("session.rest_minutes", "3").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().session.rest_minutes, 3);
    }

    #[test]
    fn load_from_rejects_out_of_range_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nrest_minutes = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
        std::fs::write(&path, "not toml [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn entries_lists_leaf_keys() {
        let keys: Vec<String> = Config::default()
            .entries()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert!(keys.contains(&"session.rest_minutes".to_string()));
        assert!(keys.contains(&"alert.sound".to_string()));
    }
}
