//! Settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If a JSON settings file is given, deep-merge it over the defaults
//! 3. Apply `KINSHIP_*` environment overrides (highest priority)
//!
//! Command-line flags are applied by the binary after [`load_settings`].

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per connection before frames are dropped.
    pub max_send_queue: usize,
    pub heartbeat_interval_secs: u64,
    /// A connection with no pong for this long is closed.
    pub heartbeat_timeout_secs: u64,
    /// Messages returned by `join_chat` and the history endpoint.
    pub history_limit: usize,
    pub max_body_chars: usize,
    /// Allowed browser origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_send_queue: 256,
            heartbeat_interval_secs: 25,
            heartbeat_timeout_secs: 60,
            history_limit: 100,
            max_body_chars: 4000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file, or `:memory:`.
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "kinship.db".into(),
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn connection_config(&self) -> kinship_store::ConnectionConfig {
        kinship_store::ConnectionConfig {
            pool_size: self.pool_size,
            busy_timeout_ms: self.busy_timeout_ms,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer. Never serialized.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub jwt_secret: Option<SecretString>,
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            leeway_secs: 30,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"kinship_store": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

/// Load settings from an optional JSON file, then apply environment
/// overrides. A missing file falls back to defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings file");
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "server.heartbeatIntervalSecs",
                reason: "must be positive".into(),
            });
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(ConfigError::Invalid {
                key: "server.heartbeatTimeoutSecs",
                reason: "must be at least the heartbeat interval".into(),
            });
        }
        if self.server.max_send_queue == 0 {
            return Err(ConfigError::Invalid {
                key: "server.maxSendQueue",
                reason: "must be positive".into(),
            });
        }
        if self.server.history_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "server.historyLimit",
                reason: "must be positive".into(),
            });
        }
        if self.server.max_body_chars == 0 {
            return Err(ConfigError::Invalid {
                key: "server.maxBodyChars",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Objects merge recursively, everything else is replaced by `source`.
/// Nulls in `source` keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Invalid values are ignored and leave the file/default value in place.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(v) = read_env_string("KINSHIP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_parsed::<u16>("KINSHIP_PORT") {
        settings.server.port = v;
    }
    if let Some(v) = read_env_parsed::<u64>("KINSHIP_HEARTBEAT_SECS").filter(|v| *v > 0) {
        settings.server.heartbeat_interval_secs = v;
        settings.server.heartbeat_timeout_secs = settings.server.heartbeat_timeout_secs.max(v);
    }
    if let Some(v) = read_env_string("KINSHIP_CORS_ORIGINS") {
        settings.server.cors_origins = parse_list(&v);
    }
    if let Some(v) = read_env_string("KINSHIP_DB_PATH") {
        settings.store.path = v;
    }
    if let Some(v) = read_env_parsed::<u32>("KINSHIP_DB_POOL_SIZE").filter(|v| *v > 0) {
        settings.store.pool_size = v;
    }
    if let Some(v) = read_env_string("KINSHIP_JWT_SECRET").or_else(|| read_env_string("JWT_SECRET")) {
        settings.auth.jwt_secret = Some(SecretString::from(v));
    }
    if let Some(v) = read_env_string("KINSHIP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("KINSHIP_LOG_JSON").and_then(|v| {
        let parsed = parse_bool(&v);
        if parsed.is_none() {
            debug!(key = "KINSHIP_LOG_JSON", value = %v, "invalid boolean env var, ignoring");
        }
        parsed
    }) {
        settings.logging.json = v;
    }
}

/// Accepts `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated list, blanks dropped.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = read_env_string(name)?;
    let parsed = val.trim().parse().ok();
    if parsed.is_none() {
        debug!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    parsed
}
