//! Storage test utilities
//!
//! Every test gets its own temporary SQLite data directory. Set
//! `TEST_DATABASE_URL` to a PostgreSQL url to also run the PostgreSQL suite.

#![allow(dead_code)]

use std::env;
use std::time::Duration;

use confstore_common::{ConfigEntry, TenantId};
use confstore_persistence::{ConfigEntryStore, Statement, StorageClient, StorageConfig};
use sea_orm::FromQueryResult;
use tempfile::TempDir;

pub const USER: &str = "2b94c631-fca9-a892-c730-03ee529ffe2a";

/// A recursive query that keeps SQLite busy for several seconds
pub const SLOW_QUERY: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 30000000) SELECT COUNT(*) AS n FROM c";

pub fn sqlite_config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        max_connections: 4,
        acquire_timeout_ms: 2_000,
        statement_timeout_ms: 10_000,
        transaction_timeout_ms: 10_000,
        ..Default::default()
    }
    .with_url(format!("sqlite://{}", dir.path().display()))
}

pub fn create_test_client() -> (StorageClient, TempDir) {
    let dir = TempDir::new().unwrap();
    let client = StorageClient::new(sqlite_config(&dir)).unwrap();
    (client, dir)
}

/// A client whose tenant pools hold a single connection
pub fn create_single_connection_client() -> (StorageClient, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        max_connections: 1,
        min_connections: 0,
        ..sqlite_config(&dir)
    };
    let client = StorageClient::new(config).unwrap();
    (client, dir)
}

pub fn create_test_store() -> (ConfigEntryStore, TempDir) {
    let (client, dir) = create_test_client();
    (ConfigEntryStore::new(client), dir)
}

/// PostgreSQL client when `TEST_DATABASE_URL` is set
pub fn postgres_client() -> Option<StorageClient> {
    let url = env::var("TEST_DATABASE_URL").ok()?;
    let config = StorageConfig {
        statement_timeout_ms: 10_000,
        transaction_timeout_ms: 10_000,
        ..Default::default()
    }
    .with_url(url);
    Some(StorageClient::new(config).unwrap())
}

pub fn tenant(name: &str) -> TenantId {
    TenantId::new(name).unwrap()
}

pub fn sample_entry() -> ConfigEntry {
    ConfigEntry::from_json(
        r#"{
            "module": "CIRCULATION",
            "configName": "validation_rules",
            "description": "for circulation",
            "code": "PATRON_RULE",
            "default": true,
            "enabled": true,
            "value": "{'fine_amount': 5}"
        }"#,
    )
    .unwrap()
}

#[derive(Debug, FromQueryResult)]
struct Count {
    n: i64,
}

/// Number of rows in `table`, read through the tenant's pool
pub async fn count_rows(client: &StorageClient, tenant: &TenantId, table: &str) -> i64 {
    let stmt = Statement::from_string(
        client.backend(),
        format!("SELECT COUNT(*) AS n FROM \"{table}\""),
    );
    let rows: Vec<Count> = client.query_as(tenant, stmt).await.unwrap();
    rows[0].n
}

pub fn short(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
