//! Persistence layer — libSQL storage for accounts, rates and the append-only logs.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{
    excerpt, DeliveryLogEntry, DeliveryStatus, ForwardLogEntry, ForwardStatus, MessageIndexEntry,
    OrderKeys, RequesterType,
};
pub use traits::Database;
