//! rsaccess-server: configuration, logging and the service facade
//!
//! This crate wires the access engine into an application:
//! - Configuration management (YAML file plus `RSACCESS_` env overrides)
//! - Structured logging setup
//! - `AccessService`, the name/id resolving facade over an `AccessStore`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rsaccess-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  observability/   - Logging setup           │
//! │  service.rs       - AccessService facade    │
//! │  main.rs          - `rsaccess` CLI          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod service;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use service::AccessService;
