//! PostgreSQL connection registry, pooled query execution, and schema cache.
//!
//! Connection strings are registered once and addressed afterwards by a
//! stable UUIDv5 identity, so credentials never travel with later calls.
//! Pools are built lazily per identity, every statement runs in its own
//! transaction with a server-enforced access mode, and the schema crawler
//! publishes immutable catalog snapshots for lock-free reads.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod schema;

pub use config::{CatalogFilter, Config, PoolSettings};
pub use db::DbService;
pub use error::{DbError, DbResult};
pub use schema::SchemaManager;
