//! Hot-reloading configuration store
//!
//! One [`ConfigStore`] holds the active snapshot of a JSON or YAML document
//! and hands out cheap clones of itself to every component that needs
//! configuration. Reads never block on file I/O: a reload parses the new
//! document first and only then swaps the snapshot pointer.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{ConfigError, Result};
use super::format::ConfigFormat;
use super::poller;
use super::snapshot::{self, ConfigSnapshot};

/// Default interval between modification checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Callback invoked with `(old, new)` after every successful reload
pub type Watcher = Arc<dyn Fn(&ConfigSnapshot, &ConfigSnapshot) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Watcher`].
///
/// Keep the returned handle to register the same watcher again: duplicates
/// are detected by pointer identity.
pub fn watcher<F>(f: F) -> Watcher
where
    F: Fn(&ConfigSnapshot, &ConfigSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The file the active snapshot came from
struct Source {
    path: PathBuf,
    format: ConfigFormat,
    last_modified: SystemTime,
}

pub(crate) struct StoreInner {
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    source: Mutex<Option<Source>>,
    watchers: Mutex<Vec<Watcher>>,
    /// Held for a whole parse-swap-notify sequence so watcher batches never overlap
    reload_lock: Mutex<()>,
    /// Thread currently running watchers, if any
    notifying: Mutex<Option<ThreadId>>,
    /// Stop flag of the live poller thread
    poller: Mutex<Option<Arc<AtomicBool>>>,
    poll_interval: Duration,
}

/// Thread-safe configuration store with dotted-path access and hot reload
///
/// Cloning is cheap and every clone refers to the same store.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path())
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl ConfigStore {
    /// Create an empty store polling every [`DEFAULT_POLL_INTERVAL`] once loaded
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Create an empty store with a custom poll interval
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                snapshot: RwLock::new(Arc::new(Value::Object(Map::new()))),
                source: Mutex::new(None),
                watchers: Mutex::new(Vec::new()),
                reload_lock: Mutex::new(()),
                notifying: Mutex::new(None),
                poller: Mutex::new(None),
                poll_interval,
            }),
        }
    }

    pub(super) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a file, inferring the format from its extension
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = resolve(path.as_ref())?;
        let format = ConfigFormat::from_path(&path);
        self.install(path, format)
    }

    /// Load a file with an explicit format
    pub fn load_with_format(&self, path: impl AsRef<Path>, format: ConfigFormat) -> Result<()> {
        let path = resolve(path.as_ref())?;
        self.install(path, format)
    }

    fn install(&self, path: PathBuf, format: ConfigFormat) -> Result<()> {
        self.reject_from_watcher("load requested from inside a watcher")?;
        {
            let _serial = lock(&self.inner.reload_lock);
            let (tree, last_modified) = read_document(&path, format)?;
            *write(&self.inner.snapshot) = Arc::new(tree);
            *lock(&self.inner.source) = Some(Source {
                path: path.clone(),
                format,
                last_modified,
            });
        }

        tracing::debug!("Loaded {} configuration from {}", format, path.display());
        self.start_watching();
        Ok(())
    }

    /// Path of the loaded file, if any
    pub fn path(&self) -> Option<PathBuf> {
        lock(&self.inner.source).as_ref().map(|s| s.path.clone())
    }

    // ========================================================================
    // Reading and writing
    // ========================================================================

    /// Read the value at a dotted key, converted to `T`.
    ///
    /// Returns `default` when any segment is missing, when a non-mapping value
    /// is met mid-path, or when the leaf does not convert to `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_value(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::debug!("Config '{}' has unexpected type ({}), using default", key, e);
                default
            }),
            None => default,
        }
    }

    /// Raw value at a dotted key
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let snapshot = self.snapshot();
        snapshot::lookup(&snapshot, key).cloned()
    }

    /// True if the dotted key resolves to a value
    pub fn contains(&self, key: &str) -> bool {
        snapshot::lookup(&self.snapshot(), key).is_some()
    }

    /// Override a value in memory.
    ///
    /// Intermediate levels are created as needed; a non-mapping intermediate
    /// is replaced by an empty mapping. The file is not touched and the next
    /// reload discards the override.
    pub fn set(&self, key: &str, value: impl Serialize) -> Result<()> {
        snapshot::split_key(key)?;
        let value = serde_json::to_value(value)?;

        let mut guard = write(&self.inner.snapshot);
        // Copy-on-write: readers holding the old Arc keep an unchanged tree
        let tree = Arc::make_mut(&mut *guard);
        snapshot::assign(tree, key, value)
    }

    /// The active snapshot
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        read(&self.inner.snapshot).clone()
    }

    /// Deep copy of the active snapshot
    pub fn to_snapshot_copy(&self) -> ConfigSnapshot {
        self.snapshot().as_ref().clone()
    }

    // ========================================================================
    // Reloading
    // ========================================================================

    /// Re-read the loaded file, swap the snapshot and notify watchers.
    ///
    /// Watchers run sequentially on the calling thread, in registration
    /// order. A watcher that fails or panics is logged and skipped.
    ///
    /// Calling this from inside a watcher returns `InvalidState`.
    pub fn reload(&self) -> Result<()> {
        self.reject_from_watcher("reload requested from inside a watcher")?;

        let _serial = lock(&self.inner.reload_lock);

        let (path, format) = match lock(&self.inner.source).as_ref() {
            Some(source) => (source.path.clone(), source.format),
            None => return Err(ConfigError::InvalidState("no configuration file has been loaded")),
        };
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }

        let (tree, last_modified) = read_document(&path, format)?;
        let new = Arc::new(tree);
        let old = std::mem::replace(&mut *write(&self.inner.snapshot), new.clone());
        if let Some(source) = lock(&self.inner.source).as_mut() {
            source.last_modified = last_modified;
        }

        tracing::debug!("Reloaded configuration from {}", path.display());
        self.notify(&old, &new);
        Ok(())
    }

    /// Reload if the file changed since the last read.
    ///
    /// Returns whether a reload happened. A missing file is not an error
    /// here: the previous snapshot stays active.
    pub(super) fn poll_once(&self) -> Result<bool> {
        let (path, last_modified) = match lock(&self.inner.source).as_ref() {
            Some(source) => (source.path.clone(), source.last_modified),
            None => return Ok(false),
        };
        if !path.exists() {
            return Ok(false);
        }

        let modified = modified_time(&path)?;
        if modified > last_modified {
            self.reload()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// The reload lock is held while watchers run, so the notifying thread
    /// must not try to take it again.
    fn reject_from_watcher(&self, reason: &'static str) -> Result<()> {
        if *lock(&self.inner.notifying) == Some(thread::current().id()) {
            return Err(ConfigError::InvalidState(reason));
        }
        Ok(())
    }

    fn notify(&self, old: &ConfigSnapshot, new: &ConfigSnapshot) {
        // Cloned so watchers may register further watchers without deadlocking
        let watchers = lock(&self.inner.watchers).clone();
        if watchers.is_empty() {
            return;
        }

        *lock(&self.inner.notifying) = Some(thread::current().id());
        for (index, watcher) in watchers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| watcher(old, new))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Config watcher #{} failed: {:#}", index, e),
                Err(_) => tracing::error!("Config watcher #{} panicked", index),
            }
        }
        *lock(&self.inner.notifying) = None;
    }

    // ========================================================================
    // Watchers
    // ========================================================================

    /// Register a watcher unless the same one is already registered.
    ///
    /// Returns `true` if it was added.
    pub fn add_watcher(&self, watcher: Watcher) -> bool {
        let mut watchers = lock(&self.inner.watchers);
        if watchers.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
            return false;
        }
        watchers.push(watcher);
        true
    }

    /// Number of registered watchers
    pub fn watcher_count(&self) -> usize {
        lock(&self.inner.watchers).len()
    }

    /// Drop every registered watcher
    pub fn clear_watchers(&self) {
        lock(&self.inner.watchers).clear();
    }

    // ========================================================================
    // Poller control
    // ========================================================================

    /// Start the poller if it is not already running
    fn start_watching(&self) {
        let mut poller = lock(&self.inner.poller);
        if poller.as_ref().is_some_and(|stop| !stop.load(Ordering::Acquire)) {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        match poller::spawn(Arc::downgrade(&self.inner), stop.clone(), self.inner.poll_interval) {
            Ok(_) => *poller = Some(stop),
            Err(e) => tracing::error!("Failed to start config poller, hot reload disabled: {}", e),
        }
    }

    /// Ask the poller to exit at its next wake-up. Does not wait for it.
    pub fn stop_watching(&self) {
        if let Some(stop) = lock(&self.inner.poller).take() {
            stop.store(true, Ordering::Release);
            tracing::debug!("Config poller stop requested");
        }
    }

    /// True while a poller is active for this store
    pub fn is_watching(&self) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|stop| !stop.load(Ordering::Acquire))
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    if !absolute.exists() {
        return Err(ConfigError::NotFound { path: absolute });
    }
    Ok(absolute)
}

/// Stat then read, so a write racing the read shows up as a newer mtime later
fn read_document(path: &Path, format: ConfigFormat) -> Result<(ConfigSnapshot, SystemTime)> {
    let last_modified = modified_time(path)?;
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    let tree = format.parse(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((tree, last_modified))
}

fn modified_time(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    if source.kind() == std::io::ErrorKind::NotFound {
        ConfigError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// A panicking watcher never holds these locks, so poisoning only means some
// other thread panicked mid-update; the data is still a complete value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
