//! Observability for rsaccess: structured logging setup.

mod logging;

pub use logging::{init_logging, LoggingConfig};
