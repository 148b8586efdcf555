//! confstore Persistence - per-tenant relational storage
//!
//! This crate provides:
//! - A pool manager holding one connection pool per tenant
//! - Lazy, idempotent provisioning of tenant namespaces
//! - A parameterized query/mutation executor
//! - Transactional batches with misuse detection
//! - Materialized result caches and their eviction
//! - The validation gate guarding writes
//! - `ConfigEntryStore`, the CRUD surface the boundary layer calls

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod executor;
pub mod pool;
pub mod schema;
mod session;
pub mod store;
pub mod traits;
pub mod transaction;
pub mod validation;

// Re-export sea-orm for convenience
pub use sea_orm;
pub use sea_orm::{DbBackend, Statement, Value};

pub use cache::CachedTable;
pub use client::StorageClient;
pub use config::StorageConfig;
pub use engine::Engine;
pub use error::{Result, StoreError};
pub use executor::{ExecOutcome, Row, StatementKind};
pub use pool::TenantPools;
pub use schema::NamespaceStatus;
pub use store::ConfigEntryStore;
pub use traits::EntryPersistence;
pub use transaction::{Mutation, TransactionScope};
pub use validation::{Trust, WriteContext};
