//! Lifecycle manager errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("tool server '{0}' is already registered")]
    DuplicateName(String),

    #[error("tool server '{name}' would bind {addr}, already claimed by '{existing}'")]
    DuplicateAddress {
        name: String,
        addr: String,
        existing: String,
    },

    #[error("no tool server named '{0}'")]
    UnknownServer(String),

    #[error("tool server '{0}' is already running")]
    AlreadyRunning(String),

    #[error("failed to spawn worker thread for '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing or invalid setting '{key}'")]
    MissingSetting { key: String },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
