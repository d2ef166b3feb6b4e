//! Tool server lifecycle
//!
//! [`ServiceLifecycleManager`] keeps a registry of [`ServerDescriptor`]s and
//! runs each one in a dedicated background worker: an OS thread with its own
//! single-threaded event loop. Workers report state through [`WorkerState`]
//! and stop cooperatively when the manager cancels them.
//!
//! ```rust,ignore
//! let mut manager = ServiceLifecycleManager::new();
//! manager.register(ServerDescriptor::new("weather", "127.0.0.1", 9001, weather_app))?;
//! manager.start_all()?;
//!
//! for endpoint in manager.endpoints() {
//!     println!("{} -> {}", endpoint.name, endpoint.sse_url());
//! }
//!
//! manager.shutdown_all(Duration::from_secs(5));
//! ```

mod descriptor;
mod error;
mod manager;
mod worker;

pub use descriptor::{ServerDescriptor, ServerEndpoint};
pub use error::{LifecycleError, Result};
pub use manager::{ServerStatus, ServiceLifecycleManager};
pub use worker::WorkerState;
