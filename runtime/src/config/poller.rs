//! Background modification poller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::store::{ConfigStore, StoreInner};

/// Spawn the polling thread for one store.
///
/// The thread holds only a weak reference to the store: it exits once `stop`
/// is raised or the last [`ConfigStore`] handle is dropped, whichever it
/// notices first after waking.
pub(super) fn spawn(
    store: Weak<StoreInner>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("config-poller".to_string())
        .spawn(move || run(store, stop, interval))
}

fn run(store: Weak<StoreInner>, stop: Arc<AtomicBool>, interval: Duration) {
    tracing::debug!("Config poller started (interval {:?})", interval);

    loop {
        thread::sleep(interval);

        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(inner) = store.upgrade() else {
            break;
        };

        match ConfigStore::from_inner(inner).poll_once() {
            Ok(true) => tracing::info!("Configuration file changed, reloaded"),
            Ok(false) => {}
            Err(e) => tracing::warn!("Hot reload check failed: {}", e),
        }
    }

    tracing::debug!("Config poller stopped");
}
