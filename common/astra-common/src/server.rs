//! Tool server contract
//!
//! This module provides the [`ToolServer`] trait: the application object a
//! runtime descriptor carries. The runtime binds the listener and owns the
//! event loop; the server only has to answer requests until told to stop.

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// An application that serves requests on an already-bound listener
///
/// Implementations must be `Send + Sync`: one instance is shared read-only
/// between the registry and the worker thread that runs it.
///
/// `serve` should return `Ok(())` once `shutdown` is cancelled and in-flight
/// requests have drained. Returning early (with or without an error) marks
/// the worker as finished.
///
/// ```rust,ignore
/// #[async_trait]
/// impl ToolServer for EchoServer {
///     fn kind(&self) -> &str {
///         "echo"
///     }
///
///     async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
///         loop {
///             tokio::select! {
///                 _ = shutdown.cancelled() => return Ok(()),
///                 accepted = listener.accept() => { /* ... */ }
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ToolServer: Send + Sync + 'static {
    /// Short label used in logs
    fn kind(&self) -> &str {
        "tool-server"
    }

    /// Serve requests on `listener` until `shutdown` is cancelled
    async fn serve(&self, listener: TcpListener, shutdown: CancellationToken)
        -> anyhow::Result<()>;
}

#[async_trait]
impl ToolServer for axum::Router {
    fn kind(&self) -> &str {
        "http"
    }

    async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        axum::serve(listener, self.clone())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}
