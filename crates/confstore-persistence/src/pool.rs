//! Per-tenant connection pools
//!
//! Each tenant gets exactly one pool for the lifetime of the process. The
//! registry slot is created under the map's shard lock, and pool creation runs
//! inside the slot's `OnceCell`, so concurrent first callers for the same
//! tenant wait on a single connect instead of racing to build duplicates.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use confstore_common::TenantId;
use dashmap::DashMap;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::engine::Engine;
use crate::error::{Result, StoreError};

type PoolSlot = Arc<OnceCell<DatabaseConnection>>;

pub struct TenantPools {
    config: Arc<StorageConfig>,
    engine: Engine,
    slots: DashMap<TenantId, PoolSlot>,
    created: AtomicUsize,
}

impl TenantPools {
    pub fn new(config: Arc<StorageConfig>, engine: Engine) -> Self {
        Self {
            config,
            engine,
            slots: DashMap::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// Get the tenant's pool, creating it on first use
    pub async fn get_pool(&self, tenant: &TenantId) -> Result<DatabaseConnection> {
        let slot = self.slots.entry(tenant.clone()).or_default().clone();
        let db = slot.get_or_try_init(|| self.connect(tenant)).await?;
        Ok(db.clone())
    }

    /// Number of pools opened since startup
    pub fn pools_created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Number of tenants with a live pool
    pub fn tenant_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    /// Close every pool; later calls open fresh ones
    pub async fn close_all(&self) {
        let drained: Vec<(TenantId, PoolSlot)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.slots.clear();

        for (tenant, slot) in drained {
            if let Some(db) = slot.get()
                && let Err(e) = db.clone().close().await
            {
                warn!(tenant = %tenant, error = %e, "Failed to close tenant pool");
            }
        }
        info!("All tenant pools closed");
    }

    pub(crate) fn connect_options(&self, tenant: &TenantId) -> ConnectOptions {
        let schema = tenant.schema_name(&self.config.module);
        let mut opt = ConnectOptions::new(self.engine.tenant_url(&schema));

        opt.max_connections(self.config.max_connections)
            .min_connections(self.config.min_connections)
            .connect_timeout(self.config.connect_timeout())
            .acquire_timeout(self.config.acquire_timeout())
            .idle_timeout(self.config.idle_timeout())
            .max_lifetime(self.config.max_lifetime())
            .sqlx_logging(self.config.sqlx_logging);

        if let Engine::Postgres { .. } = self.engine {
            opt.set_schema_search_path(schema);
        }
        opt
    }

    async fn connect(&self, tenant: &TenantId) -> Result<DatabaseConnection> {
        if let Engine::Sqlite { dir } = &self.engine {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::Connection {
                    tenant: tenant.to_string(),
                    reason: format!("cannot create data directory {}: {e}", dir.display()),
                })?;
        }

        let opt = self.connect_options(tenant);
        let db = Database::connect(opt)
            .await
            .map_err(|e| StoreError::Connection {
                tenant: tenant.to_string(),
                reason: e.to_string(),
            })?;

        self.created.fetch_add(1, Ordering::AcqRel);
        info!(
            tenant = %tenant,
            max_connections = self.config.max_connections,
            min_connections = self.config.min_connections,
            acquire_timeout_ms = self.config.acquire_timeout_ms,
            "Tenant connection pool created"
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools(url: &str) -> TenantPools {
        let config = StorageConfig::default().with_url(url);
        let engine = config.validate().unwrap();
        TenantPools::new(Arc::new(config), engine)
    }

    #[test]
    fn test_postgres_options_pin_search_path() {
        let pools = pools("postgres://u:p@localhost/okapi");
        let tenant = TenantId::new("harvard").unwrap();
        let opt = pools.connect_options(&tenant);
        assert_eq!(opt.get_url(), "postgres://u:p@localhost/okapi");
        assert_eq!(
            opt.get_schema_search_path().map(String::as_str),
            Some("harvard_mod_configuration")
        );
        assert_eq!(opt.get_max_connections(), Some(5));
    }

    #[test]
    fn test_sqlite_options_use_tenant_file() {
        let pools = pools("sqlite:///tmp/confstore");
        let tenant = TenantId::new("diku").unwrap();
        let opt = pools.connect_options(&tenant);
        assert_eq!(
            opt.get_url(),
            "sqlite:///tmp/confstore/diku_mod_configuration.db?mode=rwc"
        );
        assert!(opt.get_schema_search_path().is_none());
    }

    #[tokio::test]
    async fn test_pool_reused_per_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let pools = pools(&format!("sqlite://{}", dir.path().display()));
        let tenant = TenantId::new("diku").unwrap();

        pools.get_pool(&tenant).await.unwrap();
        pools.get_pool(&tenant).await.unwrap();
        assert_eq!(pools.pools_created(), 1);
        assert_eq!(pools.tenant_count(), 1);

        pools.close_all().await;
        assert_eq!(pools.tenant_count(), 0);
    }
}
