//! Persistence layer: libSQL-backed storage for organisations, properties,
//! tenants, numbers, conversations and tickets.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
