//! Astra runtime services
//!
//! Two long-lived services shared by the assistant process:
//!
//! - [`config`]: a hot-reloading JSON/YAML configuration store with dotted
//!   key access and change watchers
//! - [`lifecycle`]: a registry of tool servers, each run on its own
//!   background worker with its own event loop
//!
//! [`status`] is a small built-in tool server exposing health, the endpoint
//! directory and live configuration values.

pub mod config;
pub mod lifecycle;
pub mod status;
