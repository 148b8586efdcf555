//! Materialized result caches
//!
//! A cache table is a snapshot of a query's result stored inside the tenant's
//! namespace under a caller-chosen name. It is never refreshed; callers evict
//! it and materialize again.

use chrono::{DateTime, Utc};
use confstore_common::{CONFIG_TABLE, TenantId, is_identifier};
use sea_orm::{FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::StorageClient;
use crate::engine::quote_ident;
use crate::error::{Result, StoreError, is_already_exists, is_undefined_table};
use crate::session::SessionError;

/// A materialized cache table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTable {
    pub name: String,
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromQueryResult)]
struct RowCount {
    row_count: i64,
}

/// Reject names that are not plain identifiers or that would shadow storage tables
pub fn validate_cache_name(name: &str) -> Result<()> {
    if !is_identifier(name) || name == CONFIG_TABLE || name.starts_with("sqlite_") {
        return Err(StoreError::InvalidCacheName(name.to_string()));
    }
    Ok(())
}

impl StorageClient {
    /// Store the result of `query` as table `cache_name` in the tenant's namespace
    pub async fn materialize(
        &self,
        tenant: &TenantId,
        cache_name: &str,
        query: &str,
    ) -> Result<CachedTable> {
        validate_cache_name(cache_name)?;
        let db = self.connection(tenant).await?;

        if self.table_exists_on(&db, tenant, cache_name).await? {
            return Err(StoreError::CacheNameConflict(cache_name.to_string()));
        }

        let intent = format!("materialize cache '{cache_name}'");
        let ddl = format!(
            "CREATE TABLE {} AS {}",
            quote_ident(cache_name),
            query.trim().trim_end_matches(';')
        );
        let mut session = self.checkout(&db, tenant).await?;
        match session.execute(&Statement::from_string(self.backend(), ddl)).await {
            Ok(_) => {}
            Err(SessionError::Db(e)) if is_already_exists(&e) => {
                session.release();
                return Err(StoreError::CacheNameConflict(cache_name.to_string()));
            }
            Err(e) => return self.settle(session, Err(e), tenant, &intent),
        }

        let count = Statement::from_string(
            self.backend(),
            format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(cache_name)),
        );
        let counted = session.fetch(&count).await.and_then(|rows| {
            rows.first()
                .map(|row| RowCount::from_query_result(row, ""))
                .transpose()
                .map_err(SessionError::Db)
        });
        let row_count = self
            .settle(session, counted, tenant, &intent)?
            .map_or(0, |r| r.row_count.max(0) as u64);

        info!(
            tenant = %tenant,
            cache = %cache_name,
            rows = row_count,
            "Cache table materialized"
        );
        Ok(CachedTable {
            name: cache_name.to_string(),
            row_count,
            created_at: Utc::now(),
        })
    }

    /// Drop a cache table
    pub async fn evict(&self, tenant: &TenantId, cache_name: &str) -> Result<()> {
        validate_cache_name(cache_name)?;
        let db = self.connection(tenant).await?;

        if !self.table_exists_on(&db, tenant, cache_name).await? {
            return Err(StoreError::CacheNotFound(cache_name.to_string()));
        }

        let intent = format!("evict cache '{cache_name}'");
        let ddl = format!("DROP TABLE {}", quote_ident(cache_name));
        let mut session = self.checkout(&db, tenant).await?;
        match session.execute(&Statement::from_string(self.backend(), ddl)).await {
            Ok(_) => {
                session.release();
                info!(tenant = %tenant, cache = %cache_name, "Cache table evicted");
                Ok(())
            }
            Err(SessionError::Db(e)) if is_undefined_table(&e) => {
                session.release();
                Err(StoreError::CacheNotFound(cache_name.to_string()))
            }
            Err(e) => self.settle(session, Err(e), tenant, &intent),
        }
    }

    pub async fn cache_exists(&self, tenant: &TenantId, cache_name: &str) -> Result<bool> {
        validate_cache_name(cache_name)?;
        let db = self.connection(tenant).await?;
        self.table_exists_on(&db, tenant, cache_name).await
    }
}
