//! Configuration store errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by synchronous [`ConfigStore`](super::ConfigStore) calls
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but its content could not be parsed
    #[error("failed to parse configuration [{}]: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// An explicit format hint named a format the store cannot read
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// The operation needs state that has not been established yet
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Reading file content or metadata failed
    #[error("failed to read configuration [{}]: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dotted key was empty or contained an empty segment
    #[error("invalid configuration key: '{0}'")]
    InvalidKey(String),

    /// A value passed to `set` could not be represented in the tree
    #[error("value is not representable as configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A required accessor found no value
    #[error("required configuration '{key}' is not set. {description}")]
    MissingRequired { key: String, description: String },
}

impl ConfigError {
    /// True for the parse class of failures (malformed content or unknown format)
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::UnsupportedFormat(_))
    }
}

/// Underlying cause of a [`ConfigError::Parse`]
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Documents must be mappings at the top level
    #[error("document root must be a mapping, found {0}")]
    NotAMapping(&'static str),

    #[error("mapping keys must be scalars, found {0}")]
    NonScalarKey(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
