//! Background worker running one tool server
//!
//! Every worker is an OS thread with its own single-threaded tokio runtime,
//! so no two tool servers share an event loop. The thread reports its
//! progress through a `watch` channel and stops when its token is cancelled.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::descriptor::ServerDescriptor;

/// Lifecycle state of one descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum WorkerState {
    /// Registered, never started
    Registered,
    /// Thread launched, listener not bound yet
    Starting,
    /// Listener bound, serving requests
    Running,
    /// Bind or serve failed; the reason is kept for status queries
    Failed(String),
    /// Finished after cancellation (or the app returned on its own)
    Stopped,
}

impl WorkerState {
    /// Starting or Running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

/// Handle owned by the manager for one launched worker
pub(crate) struct WorkerHandle {
    state: watch::Receiver<WorkerState>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Launch a worker thread for `descriptor`. Returns once the thread exists.
    pub(crate) fn spawn(descriptor: ServerDescriptor) -> std::io::Result<Self> {
        let (tx, rx) = watch::channel(WorkerState::Starting);
        let cancel = CancellationToken::new();

        let thread = thread::Builder::new()
            .name(format!("tool-{}", descriptor.name()))
            .spawn({
                let cancel = cancel.clone();
                move || run(descriptor, tx, cancel)
            })?;

        Ok(Self {
            state: rx,
            cancel,
            thread: Some(thread),
        })
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    /// Signal the worker to stop; does not wait
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once [`stop`](Self::stop) has been called
    pub(crate) fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the worker is no longer `Starting`, or `timeout` elapses
    pub(crate) async fn wait_until_settled(&self, timeout: Duration) -> WorkerState {
        let mut rx = self.state.clone();
        let _ = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != WorkerState::Starting),
        )
        .await;
        self.state()
    }

    /// Join the thread, giving up after `timeout`.
    ///
    /// Returns `false` if the thread is still running; it stays detached.
    pub(crate) fn join(&mut self, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                self.thread = Some(thread);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let _ = thread.join();
        true
    }
}

fn run(descriptor: ServerDescriptor, tx: watch::Sender<WorkerState>, cancel: CancellationToken) {
    let name = descriptor.name().to_string();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("[{}] Failed to build worker runtime: {}", name, e);
            tx.send_replace(WorkerState::Failed(format!("runtime: {}", e)));
            return;
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(serve(&descriptor, &tx, cancel))
    }));

    let final_state = match outcome {
        Ok(Ok(())) => {
            tracing::info!("[{}] Tool server stopped", name);
            WorkerState::Stopped
        }
        Ok(Err(e)) => {
            tracing::error!("[{}] Tool server failed: {:#}", name, e);
            WorkerState::Failed(format!("{:#}", e))
        }
        Err(_) => {
            tracing::error!("[{}] Tool server panicked", name);
            WorkerState::Failed("panicked".to_string())
        }
    };
    tx.send_replace(final_state);
}

async fn serve(
    descriptor: &ServerDescriptor,
    tx: &watch::Sender<WorkerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = descriptor.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tx.send_replace(WorkerState::Running);
    tracing::info!(
        "[{}] {} tool server listening on {}",
        descriptor.name(),
        descriptor.app().kind(),
        listener.local_addr().map(|a| a.to_string()).unwrap_or(addr)
    );

    descriptor.app().serve(listener, cancel).await
}
