//! Well-known configuration keys
//!
//! The chat API group is read by the request layer when it builds a
//! completion client; the rest drive the runtime itself.

use serde::Serialize;

use super::accessor::{AccessInfo, ConfigAccessor};
use super::error::Result;
use super::store::ConfigStore;

// ============================================================================
// Chat API
// ============================================================================

pub static API_KEY: ConfigAccessor<String> =
    ConfigAccessor::required("AstraCore.api.api_key", empty_string, "Chat completion API key");

pub static API_BASE: ConfigAccessor<String> =
    ConfigAccessor::new("AstraCore.api.api_base", default_api_base, "Chat completion API base URL");

pub static MODEL: ConfigAccessor<String> =
    ConfigAccessor::new("AstraCore.api.model", default_model, "Chat model name");

pub static TEMPERATURE: ConfigAccessor<f64> =
    ConfigAccessor::new("AstraCore.api.temperature", default_temperature, "Sampling temperature");

pub static SYSTEM_PROMPT: ConfigAccessor<String> =
    ConfigAccessor::new("AstraCore.api.system_prompt", default_system_prompt, "System prompt");

pub static API_TIMEOUT_SECS: ConfigAccessor<u64> =
    ConfigAccessor::new("openai.timeout", default_timeout, "API call timeout (seconds)");

// ============================================================================
// Database
// ============================================================================

pub static DATABASE_URL: ConfigAccessor<String> =
    ConfigAccessor::required("database.url", default_database_url, "Database connection URL");

pub static DATABASE_POOL_SIZE: ConfigAccessor<u32> =
    ConfigAccessor::new("database.pool_size", default_pool_size, "Database connection pool size");

// ============================================================================
// Runtime
// ============================================================================

pub static LOG_LEVEL: ConfigAccessor<String> =
    ConfigAccessor::new("log.level", default_log_level, "Log level");

pub static LOG_FILE: ConfigAccessor<String> =
    ConfigAccessor::new("log.file", default_log_file, "Log file path");

pub static SERVER_HOST: ConfigAccessor<String> =
    ConfigAccessor::new("server.host", default_server_host, "Request layer bind host");

pub static SERVER_PORT: ConfigAccessor<u16> =
    ConfigAccessor::new("server.port", default_server_port, "Request layer bind port");

// ============================================================================
// Cache
// ============================================================================

pub static REDIS_URL: ConfigAccessor<String> =
    ConfigAccessor::new("cache.redis_url", default_redis_url, "Redis connection URL");

pub static CACHE_TTL_SECS: ConfigAccessor<u64> =
    ConfigAccessor::new("cache.ttl", default_cache_ttl, "Cache entry lifetime (seconds)");

/// Prefix under which each tool server keeps its `host` and `port`
pub const TOOL_SERVERS_PREFIX: &str = "tool_servers";

/// Default bind host for tool servers without an explicit `host`
pub const DEFAULT_TOOL_HOST: &str = "127.0.0.1";

fn empty_string() -> String {
    String::new()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_system_prompt() -> String {
    "You are a helpful AI".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_database_url() -> String {
    "sqlite:///./data.db".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_log_file() -> String {
    "./logs/app.log".to_string()
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Chat API settings read together
#[derive(Debug, Clone, Serialize)]
pub struct ApiSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl ApiSettings {
    /// Read the whole group; fails if the API key is missing
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        Ok(Self {
            api_key: API_KEY.value(store)?,
            api_base: API_BASE.value(store)?,
            model: MODEL.value(store)?,
            temperature: TEMPERATURE.value(store)?,
            system_prompt: SYSTEM_PROMPT.value(store)?,
            timeout_secs: API_TIMEOUT_SECS.value(store)?,
        })
    }
}

/// Access statistics of every well-known accessor
pub fn access_report() -> Vec<AccessInfo> {
    vec![
        API_KEY.access_info(),
        API_BASE.access_info(),
        MODEL.access_info(),
        TEMPERATURE.access_info(),
        SYSTEM_PROMPT.access_info(),
        API_TIMEOUT_SECS.access_info(),
        DATABASE_URL.access_info(),
        DATABASE_POOL_SIZE.access_info(),
        LOG_LEVEL.access_info(),
        LOG_FILE.access_info(),
        SERVER_HOST.access_info(),
        SERVER_PORT.access_info(),
        REDIS_URL.access_info(),
        CACHE_TTL_SECS.access_info(),
    ]
}
