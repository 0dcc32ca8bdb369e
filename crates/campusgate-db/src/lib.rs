//! campusgate database: SurrealDB connection management, schema
//! migrations, and the SurrealDB-backed record store.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - A [`RecordStore`](campusgate_core::RecordStore) implementation
//!   ([`SurrealRecordStore`])
//! - Error types ([`DbError`])

mod connection;
mod error;
mod schema;
mod store;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use store::SurrealRecordStore;
