//! Persistence for xenia sensor observations.
//!
//! Provides:
//! - Database configuration for PostgreSQL or SQLite stores
//! - Entity resolution for the organization → platform → taxonomy → sensor graph
//! - Single record observation inserts and add-or-update
//! - A background writer that drains a bounded queue with batched commits
//!
//! The database backend is selected at compile time: `sqlite` (default) or
//! `postgres`. When both features are enabled PostgreSQL is used.

pub mod config;
pub mod observations;
pub mod pool;
pub mod resolver;
pub mod schema;
pub mod writer;

pub use config::{DatabaseConfig, StoreKind, WriterConfig};
pub use observations::ObservationStore;
pub use pool::{connect, Db, DbConnection, DbPool};
pub use resolver::{EntityResolver, OrganizationDetails, PlatformDetails, SensorSpec};
pub use schema::ensure_schema;
pub use writer::{ObservationSender, WriterHandle, WriterReport, WriterState};
