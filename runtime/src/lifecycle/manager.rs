//! Registry of tool servers and their background workers

use std::time::{Duration, Instant};

use serde::Serialize;

use super::descriptor::{ServerDescriptor, ServerEndpoint};
use super::error::{LifecycleError, Result};
use super::worker::{WorkerHandle, WorkerState};

/// How long a restart waits for a stopped worker to release its listener
const RESTART_GRACE: Duration = Duration::from_secs(5);

struct Entry {
    descriptor: ServerDescriptor,
    worker: Option<WorkerHandle>,
}

impl Entry {
    fn state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map(WorkerHandle::state)
            .unwrap_or(WorkerState::Registered)
    }
}

/// Snapshot of one registered server, for status pages and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    #[serde(flatten)]
    pub endpoint: ServerEndpoint,
    #[serde(flatten)]
    pub state: WorkerState,
}

/// Owns the tool server registry and launches each entry in its own worker.
///
/// Registration order is preserved by [`endpoints`](Self::endpoints).
/// Starting never blocks on the server binding; use
/// [`wait_until_settled`](Self::wait_until_settled) or
/// [`state`](Self::state) to observe the outcome.
#[derive(Default)]
pub struct ServiceLifecycleManager {
    entries: Vec<Entry>,
}

impl ServiceLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor to the registry.
    ///
    /// Names must be unique, and two descriptors may not bind the same
    /// socket (see [`ServerDescriptor`] address rules). Port 0 is exempt:
    /// an ephemeral port is picked at bind.
    pub fn register(&mut self, descriptor: ServerDescriptor) -> Result<()> {
        self.check_unique(&descriptor)?;
        tracing::debug!("Registered tool server {:?}", descriptor);
        self.entries.push(Entry {
            descriptor,
            worker: None,
        });
        Ok(())
    }

    /// Register several descriptors. Nothing is added if any of them conflicts.
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = ServerDescriptor>,
    ) -> Result<()> {
        let batch: Vec<ServerDescriptor> = descriptors.into_iter().collect();

        let mut staged = ServiceLifecycleManager::new();
        for descriptor in &batch {
            self.check_unique(descriptor)?;
            staged.register(descriptor.clone())?;
        }

        for descriptor in batch {
            self.register(descriptor)?;
        }
        Ok(())
    }

    fn check_unique(&self, descriptor: &ServerDescriptor) -> Result<()> {
        for entry in &self.entries {
            let existing = &entry.descriptor;
            if existing.name() == descriptor.name() {
                return Err(LifecycleError::DuplicateName(descriptor.name().to_string()));
            }
            if descriptor.conflicts_with(existing) {
                return Err(LifecycleError::DuplicateAddress {
                    name: descriptor.name().to_string(),
                    addr: descriptor.addr(),
                    existing: existing.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Launch the named server in a background worker and return immediately.
    ///
    /// A server that already has an active worker is rejected with
    /// [`LifecycleError::AlreadyRunning`]; a failed or stopped one is relaunched.
    /// After [`stop`](Self::stop) this blocks briefly until the old worker exits.
    pub fn start_in_background(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.name() == name)
            .ok_or_else(|| LifecycleError::UnknownServer(name.to_string()))?;

        if let Some(worker) = entry.worker.as_mut() {
            // A worker asked to stop is waited for, then replaced
            if worker.state().is_active() && !(worker.is_stopping() && worker.join(RESTART_GRACE)) {
                return Err(LifecycleError::AlreadyRunning(name.to_string()));
            }
        }

        if let Some(mut previous) = entry.worker.take() {
            previous.join(Duration::ZERO);
        }

        let worker =
            WorkerHandle::spawn(entry.descriptor.clone()).map_err(|source| LifecycleError::Spawn {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(
            "Starting tool server '{}' on {}",
            name,
            entry.descriptor.addr()
        );
        entry.worker = Some(worker);
        Ok(())
    }

    /// Start every registered server that is not already active, in
    /// registration order. A failure to spawn one worker does not stop the rest.
    pub fn start_all(&mut self) -> Result<()> {
        let pending: Vec<String> = self
            .entries
            .iter()
            .filter(|e| {
                let active = e.state().is_active();
                if active {
                    tracing::debug!("Tool server '{}' already running, skipped", e.descriptor.name());
                }
                !active
            })
            .map(|e| e.descriptor.name().to_string())
            .collect();

        let mut first_error = None;
        for name in pending {
            if let Err(e) = self.start_in_background(&name) {
                tracing::error!("Failed to start tool server '{}': {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Endpoints of all registered servers, in registration order
    pub fn endpoints(&self) -> Vec<ServerEndpoint> {
        self.entries
            .iter()
            .map(|e| e.descriptor.endpoint())
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self, name: &str) -> Option<WorkerState> {
        self.find(name).map(Entry::state)
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.entries
            .iter()
            .map(|e| ServerStatus {
                endpoint: e.descriptor.endpoint(),
                state: e.state(),
            })
            .collect()
    }

    /// Wait until the named server has either bound its listener or failed.
    ///
    /// Returns the state observed when waiting ended; this can still be
    /// `Starting` if `timeout` elapsed first.
    pub async fn wait_until_settled(&self, name: &str, timeout: Duration) -> Result<WorkerState> {
        let entry = self
            .find(name)
            .ok_or_else(|| LifecycleError::UnknownServer(name.to_string()))?;

        match &entry.worker {
            Some(worker) => Ok(worker.wait_until_settled(timeout).await),
            None => Ok(WorkerState::Registered),
        }
    }

    /// Signal the named server to stop. Does not wait for it.
    pub fn stop(&self, name: &str) -> Result<()> {
        let entry = self
            .find(name)
            .ok_or_else(|| LifecycleError::UnknownServer(name.to_string()))?;
        if let Some(worker) = &entry.worker {
            worker.stop();
        }
        Ok(())
    }

    /// Stop every worker and wait up to `timeout` overall for them to exit.
    ///
    /// Returns the names of servers whose threads were still running when
    /// the deadline passed; those threads are left detached.
    pub fn shutdown_all(&mut self, timeout: Duration) -> Vec<String> {
        for entry in &self.entries {
            if let Some(worker) = &entry.worker {
                worker.stop();
            }
        }

        let deadline = Instant::now() + timeout;
        let mut stragglers = Vec::new();
        for entry in &mut self.entries {
            let Some(worker) = entry.worker.as_mut() else {
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !worker.join(remaining) {
                tracing::warn!(
                    "Tool server '{}' did not stop within {:?}",
                    entry.descriptor.name(),
                    timeout
                );
                stragglers.push(entry.descriptor.name().to_string());
            }
        }

        if stragglers.is_empty() {
            tracing::info!("All tool servers stopped");
        }
        stragglers
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.descriptor.name() == name)
    }
}

impl Drop for ServiceLifecycleManager {
    fn drop(&mut self) {
        for entry in &self.entries {
            if let Some(worker) = &entry.worker {
                worker.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_common::ToolServer;
    use std::sync::Arc;

    fn app() -> Arc<dyn ToolServer> {
        Arc::new(axum::Router::<()>::new())
    }

    #[test]
    fn test_endpoints_follow_registration_order() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 9001, app()))
            .unwrap();
        manager
            .register(ServerDescriptor::new("stock", "127.0.0.1", 9002, app()))
            .unwrap();

        let endpoints = manager.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name, "weather");
        assert_eq!(endpoints[0].port, 9001);
        assert_eq!(endpoints[1].name, "stock");
        assert_eq!(endpoints[1].port, 9002);
        assert_eq!(manager.state("weather"), Some(WorkerState::Registered));
    }

    #[test]
    fn test_empty_registry() {
        let mut manager = ServiceLifecycleManager::new();
        assert!(manager.is_empty());
        assert!(manager.endpoints().is_empty());
        manager.start_all().unwrap();
        assert!(manager.shutdown_all(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 9001, app()))
            .unwrap();

        let err = manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 9005, app()))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateName(ref n) if n == "weather"));

        let err = manager
            .register(ServerDescriptor::new("stock", "127.0.0.1", 9001, app()))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateAddress { ref existing, .. } if existing == "weather"));

        // Ephemeral ports never collide
        manager
            .register(ServerDescriptor::new("a", "127.0.0.1", 0, app()))
            .unwrap();
        manager
            .register(ServerDescriptor::new("b", "127.0.0.1", 0, app()))
            .unwrap();
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_rejects_equivalent_addresses() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "0.0.0.0", 9001, app()))
            .unwrap();

        let err = manager
            .register(ServerDescriptor::new("stock", "127.0.0.1", 9001, app()))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateAddress { ref existing, .. } if existing == "weather"));

        manager
            .register(ServerDescriptor::new("stock", "127.0.0.1", 9002, app()))
            .unwrap();
        let err = manager
            .register(ServerDescriptor::new("news", "localhost", 9002, app()))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateAddress { ref existing, .. } if existing == "stock"));
    }

    #[test]
    fn test_register_all_is_atomic() {
        let mut manager = ServiceLifecycleManager::new();
        let err = manager
            .register_all([
                ServerDescriptor::new("weather", "127.0.0.1", 9001, app()),
                ServerDescriptor::new("stock", "127.0.0.1", 9001, app()),
            ])
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateAddress { .. }));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unknown_server() {
        let mut manager = ServiceLifecycleManager::new();
        assert!(matches!(
            manager.start_in_background("ghost"),
            Err(LifecycleError::UnknownServer(_))
        ));
        assert!(manager.stop("ghost").is_err());
        assert_eq!(manager.state("ghost"), None);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 0, app()))
            .unwrap();

        manager.start_in_background("weather").unwrap();
        let state = manager
            .wait_until_settled("weather", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state, WorkerState::Running);

        let err = manager.start_in_background("weather").unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyRunning(_)));

        // start_all skips the active entry instead of failing
        manager.start_all().unwrap();

        assert!(manager.shutdown_all(Duration::from_secs(5)).is_empty());
        assert_eq!(manager.state("weather"), Some(WorkerState::Stopped));
    }

    #[tokio::test]
    async fn test_stopped_server_can_restart() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 0, app()))
            .unwrap();

        manager.start_in_background("weather").unwrap();
        manager
            .wait_until_settled("weather", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(manager.shutdown_all(Duration::from_secs(5)).is_empty());

        manager.start_in_background("weather").unwrap();
        let state = manager
            .wait_until_settled("weather", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state, WorkerState::Running);
        assert!(manager.shutdown_all(Duration::from_secs(5)).is_empty());
    }

    #[tokio::test]
    async fn test_single_server_restarts_after_stop() {
        let mut manager = ServiceLifecycleManager::new();
        manager
            .register(ServerDescriptor::new("weather", "127.0.0.1", 0, app()))
            .unwrap();
        manager
            .register(ServerDescriptor::new("stock", "127.0.0.1", 0, app()))
            .unwrap();
        manager.start_all().unwrap();
        for name in ["weather", "stock"] {
            let state = manager
                .wait_until_settled(name, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(state, WorkerState::Running);
        }

        manager.stop("weather").unwrap();
        manager.start_in_background("weather").unwrap();
        let state = manager
            .wait_until_settled("weather", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state, WorkerState::Running);

        // The other server was never touched
        assert_eq!(manager.state("stock"), Some(WorkerState::Running));
        assert!(matches!(
            manager.start_in_background("stock"),
            Err(LifecycleError::AlreadyRunning(_))
        ));

        assert!(manager.shutdown_all(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_status_serialization() {
        let status = ServerStatus {
            endpoint: ServerEndpoint {
                name: "weather".into(),
                host: "127.0.0.1".into(),
                port: 9001,
            },
            state: WorkerState::Running,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "weather", "host": "127.0.0.1", "port": 9001, "state": "running"})
        );
    }
}
