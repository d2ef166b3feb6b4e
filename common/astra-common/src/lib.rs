//! Astra Common - Shared utilities for the runtime and its tool servers
//!
//! This crate provides functionality used by the runtime binary and by any
//! tool server it hosts:
//!
//! - **Initialization**: [`init_tracing`] for standardized logging setup
//! - **Tool servers**: the [`ToolServer`] contract every hosted server implements
//!
//! # Example
//!
//! ```rust,ignore
//! use astra_common::{init_tracing, ToolServer};
//! use axum::{routing::get, Router};
//!
//! init_tracing("astra_runtime", None)?;
//!
//! // Any axum router can be handed to the lifecycle manager as-is
//! let app: Arc<dyn ToolServer> = Arc::new(Router::new().route("/sse", get(handler)));
//! ```

pub mod init;
pub mod server;

// Re-export commonly used items at crate root
pub use init::init_tracing;
pub use server::ToolServer;

// Re-export the pieces implementors need
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
