//! Persistence layer. libSQL-backed storage for accounts, actors and
//! businesses.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{NewActor, ProfileStore};
