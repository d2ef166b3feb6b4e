//! Typed configuration accessors
//!
//! A [`ConfigAccessor`] names one dotted key together with its default, a
//! human description and whether it must be present. Accessors are plain
//! statics, so they are declared once and read through whichever store the
//! caller holds. Every read is counted for diagnostics.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::error::{ConfigError, Result};
use super::store::ConfigStore;

/// Access statistics of one accessor
#[derive(Debug, Clone, Serialize)]
pub struct AccessInfo {
    pub key: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub access_count: u64,
    pub last_value: Option<Value>,
    pub last_access: Option<DateTime<Local>>,
}

#[derive(Debug)]
struct AccessStats {
    count: u64,
    last_value: Option<Value>,
    last_access: Option<DateTime<Local>>,
}

/// A named, typed view of one configuration key
#[derive(Debug)]
pub struct ConfigAccessor<T> {
    key: &'static str,
    default: fn() -> T,
    description: &'static str,
    required: bool,
    stats: Mutex<AccessStats>,
}

impl<T> ConfigAccessor<T>
where
    T: DeserializeOwned + Serialize,
{
    /// An optional key falling back to `default()`
    pub const fn new(key: &'static str, default: fn() -> T, description: &'static str) -> Self {
        Self::build(key, default, description, false)
    }

    /// A key that must be present; `default()` still covers values of the wrong type
    pub const fn required(
        key: &'static str,
        default: fn() -> T,
        description: &'static str,
    ) -> Self {
        Self::build(key, default, description, true)
    }

    const fn build(
        key: &'static str,
        default: fn() -> T,
        description: &'static str,
        required: bool,
    ) -> Self {
        Self {
            key,
            default,
            description,
            required,
            stats: Mutex::new(AccessStats {
                count: 0,
                last_value: None,
                last_access: None,
            }),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Read the current value from `store`.
    ///
    /// Fails with `MissingRequired` when a required key is absent or null.
    pub fn value(&self, store: &ConfigStore) -> Result<T> {
        let raw = store.get_value(self.key).filter(|v| !v.is_null());

        let value = match raw {
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
                tracing::warn!("Config '{}' has unexpected type ({}), using default", self.key, e);
                (self.default)()
            }),
            None if self.required => {
                self.record(None);
                return Err(ConfigError::MissingRequired {
                    key: self.key.to_string(),
                    description: self.description.to_string(),
                });
            }
            None => (self.default)(),
        };

        self.record(serde_json::to_value(&value).ok());
        Ok(value)
    }

    fn record(&self, value: Option<Value>) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.count += 1;
        stats.last_value = value;
        stats.last_access = Some(Local::now());
    }

    /// Snapshot of the access statistics
    pub fn access_info(&self) -> AccessInfo {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        AccessInfo {
            key: self.key,
            description: self.description,
            required: self.required,
            access_count: stats.count,
            last_value: stats.last_value.clone(),
            last_access: stats.last_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default_port() -> u16 {
        8000
    }

    fn default_token() -> String {
        String::new()
    }

    fn store_with(tree: Value) -> ConfigStore {
        let store = ConfigStore::new();
        if let Value::Object(map) = tree {
            for (k, v) in map {
                store.set(&k, v).unwrap();
            }
        }
        store
    }

    #[test]
    fn test_optional_accessor_uses_default() {
        static PORT: ConfigAccessor<u16> = ConfigAccessor::new("server.port", default_port, "Server port");
        let store = store_with(json!({}));
        assert_eq!(PORT.value(&store).unwrap(), 8000);

        store.set("server.port", 9100).unwrap();
        assert_eq!(PORT.value(&store).unwrap(), 9100);

        let info = PORT.access_info();
        assert_eq!(info.access_count, 2);
        assert_eq!(info.last_value, Some(json!(9100)));
        assert!(info.last_access.is_some());
        assert!(!info.required);
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let port: ConfigAccessor<u16> = ConfigAccessor::new("server.port", default_port, "Server port");
        let store = store_with(json!({"server": {"port": "eighty"}}));
        assert_eq!(port.value(&store).unwrap(), 8000);
    }

    #[test]
    fn test_required_accessor() {
        let token: ConfigAccessor<String> =
            ConfigAccessor::required("bot.token", default_token, "Bot platform token");
        let store = store_with(json!({"bot": {"token": null}}));

        let err = token.value(&store).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "bot.token"));
        assert!(err.to_string().contains("Bot platform token"));
        assert_eq!(token.access_info().access_count, 1);

        store.set("bot.token", "secret").unwrap();
        assert_eq!(token.value(&store).unwrap(), "secret");
    }
}
