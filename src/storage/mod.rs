//! Storage engine for CortexPool
//!
//! Handles SQLite database operations, WAL mode, and schema management.
//! The engine is the intended single owner of its datafile; callers
//! sharing an instance must serialize externally.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use migrations::SCHEMA_VERSION;
