//! Storage client
//!
//! `StorageClient` is the handle the host owns: it holds the pool registry,
//! the provisioning registry and the timeouts applied to every call. Clones
//! share the registries, so `with_timeout` views cost one `Arc` bump.

use std::sync::Arc;
use std::time::Duration;

use confstore_common::TenantId;
use dashmap::DashMap;
use sea_orm::{DatabaseConnection, DbBackend};
use tracing::info;

use crate::config::StorageConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::pool::TenantPools;
use crate::schema::NamespaceSlot;

pub(crate) struct ClientInner {
    pub(crate) config: Arc<StorageConfig>,
    pub(crate) engine: Engine,
    pub(crate) pools: TenantPools,
    pub(crate) namespaces: DashMap<TenantId, Arc<NamespaceSlot>>,
}

#[derive(Clone)]
pub struct StorageClient {
    pub(crate) inner: Arc<ClientInner>,
    pub(crate) statement_timeout: Duration,
    pub(crate) transaction_timeout: Duration,
}

impl StorageClient {
    /// Build a client; no connection is opened until a tenant is first used
    pub fn new(config: StorageConfig) -> Result<Self> {
        let engine = config.validate()?;
        let config = Arc::new(config);
        let statement_timeout = config.statement_timeout();
        let transaction_timeout = config.transaction_timeout();

        info!(
            backend = ?engine.backend(),
            module = %config.module,
            statement_timeout_ms = config.statement_timeout_ms,
            transaction_timeout_ms = config.transaction_timeout_ms,
            "Storage client configured"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                pools: TenantPools::new(config.clone(), engine.clone()),
                config,
                engine,
                namespaces: DashMap::new(),
            }),
            statement_timeout,
            transaction_timeout,
        })
    }

    /// A view of this client whose statements are bounded by `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            statement_timeout: timeout,
            ..self.clone()
        }
    }

    /// A view of this client whose transactional waits are bounded by `timeout`
    pub fn with_transaction_timeout(&self, timeout: Duration) -> Self {
        Self {
            transaction_timeout: timeout,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn backend(&self) -> DbBackend {
        self.inner.engine.backend()
    }

    pub fn pools(&self) -> &TenantPools {
        &self.inner.pools
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    /// Namespace name for a tenant under the configured module
    pub fn schema_name(&self, tenant: &TenantId) -> String {
        tenant.schema_name(&self.inner.config.module)
    }

    /// The tenant's pool, with its namespace provisioned
    pub(crate) async fn connection(&self, tenant: &TenantId) -> Result<DatabaseConnection> {
        let db = self.inner.pools.get_pool(tenant).await?;
        self.ensure_namespace_on(&db, tenant).await?;
        Ok(db)
    }

    /// Round-trip a trivial statement through the tenant's pool
    pub async fn health_check(&self, tenant: &TenantId) -> Result<()> {
        self.execute(tenant, "SELECT 1 AS ok", Vec::new()).await?;
        Ok(())
    }

    /// Close every tenant pool and forget provisioning state
    pub async fn shutdown(&self) {
        self.inner.pools.close_all().await;
        self.inner.namespaces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = StorageConfig::default().with_url("oracle://db");
        assert!(matches!(
            StorageClient::new(config),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_timeout_views_share_registries() {
        let client = StorageClient::new(StorageConfig::default()).unwrap();
        let fast = client.with_timeout(Duration::from_millis(250));
        assert_eq!(fast.statement_timeout(), Duration::from_millis(250));
        assert_eq!(client.statement_timeout(), Duration::from_secs(60));
        assert!(Arc::ptr_eq(&client.inner, &fast.inner));

        let tx = client.with_transaction_timeout(Duration::from_secs(1));
        assert_eq!(tx.transaction_timeout(), Duration::from_secs(1));
        assert_eq!(tx.statement_timeout(), client.statement_timeout());
    }

    #[test]
    fn test_schema_name_uses_module() {
        let client = StorageClient::new(StorageConfig::default()).unwrap();
        let tenant = TenantId::new("harvard").unwrap();
        assert_eq!(client.schema_name(&tenant), "harvard_mod_configuration");
        assert_eq!(client.backend(), DbBackend::Postgres);
    }
}
