//! rsaccess-storage: Storage abstraction layer
//!
//! This crate provides the persistent store contract for the access graph:
//! - AccessStore trait for storage operations
//! - In-memory implementation over the domain engine
//! - SQLite implementation with closure views and the `join()` builder
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rsaccess-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs     - AccessStore trait          │
//! │  memory.rs     - In-memory implementation   │
//! │  sqlite.rs     - SQLite implementation      │
//! │  access_sql.rs - Schema and SQL predicates  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod access_sql;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-export commonly used types
pub use access_sql::{access_join, ResourceJoin};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryAccessStore;
pub use sqlite::{SqliteAccessStore, SqliteConfig};
pub use traits::AccessStore;
