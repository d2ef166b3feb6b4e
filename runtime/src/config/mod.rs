//! Configuration store
//!
//! A single [`ConfigStore`] is created at startup, loaded from a JSON or YAML
//! file and passed by clone to every component. It supports:
//!
//! - Dotted-path reads and in-memory overrides: `store.get("server.port", 8000)`
//! - Hot reload: a background poller re-reads the file when its mtime moves
//! - Watchers notified with `(old, new)` snapshots after every reload
//!
//! # Example
//!
//! ```rust,ignore
//! use astra_runtime::config::{watcher, ConfigStore};
//!
//! let store = ConfigStore::new();
//! store.load("config/config.json")?;
//!
//! let model: String = store.get("AstraCore.api.model", "gpt-3.5-turbo".to_string());
//! store.add_watcher(watcher(|old, new| {
//!     tracing::info!("model is now {}", new["AstraCore"]["api"]["model"]);
//!     Ok(())
//! }));
//! ```

pub mod accessor;
mod error;
mod format;
pub mod keys;
mod poller;
mod snapshot;
mod store;

pub use accessor::{AccessInfo, ConfigAccessor};
pub use error::{ConfigError, ParseError, Result};
pub use format::ConfigFormat;
pub use snapshot::{changed_keys, ConfigSnapshot};
pub use store::{watcher, ConfigStore, Watcher, DEFAULT_POLL_INTERVAL};
