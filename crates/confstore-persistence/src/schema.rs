//! Tenant namespace provisioning
//!
//! A namespace is ready once its base table exists. Provisioning runs at most
//! once per tenant per process: callers serialize on the tenant's slot lock,
//! and a concurrent creator in another process is detected through the
//! "already exists" errors the engine raises.

use std::sync::atomic::{AtomicBool, Ordering};

use confstore_common::{CONFIG_TABLE, TenantId};
use sea_orm::{DatabaseConnection, FromQueryResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::StorageClient;
use crate::error::{Result, StoreError, is_already_exists};
use crate::session::{Session, SessionError};

/// Outcome of `ensure_namespace`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceStatus {
    Created,
    AlreadyProvisioned,
}

#[derive(Default)]
pub(crate) struct NamespaceSlot {
    ready: AtomicBool,
    lock: Mutex<()>,
}

#[derive(Debug, FromQueryResult)]
struct Presence {
    present: i64,
}

impl StorageClient {
    /// Make sure the tenant's namespace and base table exist
    pub async fn ensure_namespace(&self, tenant: &TenantId) -> Result<NamespaceStatus> {
        let db = self.inner.pools.get_pool(tenant).await?;
        self.ensure_namespace_on(&db, tenant).await
    }

    /// Whether the tenant's base table exists, without creating anything
    pub async fn namespace_exists(&self, tenant: &TenantId) -> Result<bool> {
        let db = self.inner.pools.get_pool(tenant).await?;
        self.table_exists_on(&db, tenant, CONFIG_TABLE).await
    }

    pub(crate) async fn ensure_namespace_on(
        &self,
        db: &DatabaseConnection,
        tenant: &TenantId,
    ) -> Result<NamespaceStatus> {
        let slot = self
            .inner
            .namespaces
            .entry(tenant.clone())
            .or_default()
            .clone();
        if slot.ready.load(Ordering::Acquire) {
            return Ok(NamespaceStatus::AlreadyProvisioned);
        }

        let _guard = slot.lock.lock().await;
        if slot.ready.load(Ordering::Acquire) {
            return Ok(NamespaceStatus::AlreadyProvisioned);
        }

        let status = self.provision(db, tenant).await?;
        slot.ready.store(true, Ordering::Release);
        Ok(status)
    }

    pub(crate) async fn table_exists_on(
        &self,
        db: &DatabaseConnection,
        tenant: &TenantId,
        table: &str,
    ) -> Result<bool> {
        let schema = self.schema_name(tenant);
        let stmt = self.inner.engine.table_exists_statement(&schema, table);
        let rows: Vec<Presence> = self.fetch_on(db, tenant, "catalog lookup", &stmt).await?;
        Ok(rows.first().is_some_and(|r| r.present > 0))
    }

    async fn provision(&self, db: &DatabaseConnection, tenant: &TenantId) -> Result<NamespaceStatus> {
        let schema = self.schema_name(tenant);
        if self.table_exists_on(db, tenant, CONFIG_TABLE).await? {
            debug!(tenant = %tenant, schema = %schema, "Namespace already provisioned");
            return Ok(NamespaceStatus::AlreadyProvisioned);
        }

        let ddl = self.inner.engine.namespace_ddl(&schema);
        let created = async {
            let mut session = Session::begin(db, self.transaction_timeout).await?;
            for stmt in &ddl {
                session.execute(stmt).await?;
            }
            session.commit().await
        }
        .await;

        match created {
            Ok(()) => {
                info!(tenant = %tenant, schema = %schema, "Tenant namespace created");
                Ok(NamespaceStatus::Created)
            }
            Err(SessionError::Db(e)) if is_already_exists(&e) => {
                warn!(
                    tenant = %tenant,
                    schema = %schema,
                    "Namespace created concurrently by another process"
                );
                Ok(NamespaceStatus::AlreadyProvisioned)
            }
            Err(e) => Err(StoreError::from_session(
                e,
                tenant,
                "provision namespace",
                self.transaction_timeout,
            )),
        }
    }
}
