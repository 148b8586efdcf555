//! Entry persistence trait
//!
//! Defines the interface the boundary layer programs against, so handlers
//! can be tested against an in-memory double.

use async_trait::async_trait;
use confstore_common::{ConfigEntry, EntryFilter, EntryPage, TenantId};

use crate::error::Result;
use crate::store::ConfigEntryStore;
use crate::validation::WriteContext;

/// Configuration entry persistence operations
#[async_trait]
pub trait EntryPersistence: Send + Sync {
    /// Validate and store a new entry
    async fn entry_create(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entry: ConfigEntry,
    ) -> Result<ConfigEntry>;

    /// Store several entries atomically
    async fn entry_create_batch(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entries: Vec<ConfigEntry>,
    ) -> Result<Vec<ConfigEntry>>;

    /// Find an entry by id
    async fn entry_find(&self, tenant: &TenantId, id: &str) -> Result<Option<ConfigEntry>>;

    /// Replace an entry; `false` when it does not exist
    async fn entry_update(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        id: &str,
        entry: ConfigEntry,
    ) -> Result<bool>;

    /// Delete an entry, returning the number of rows removed
    async fn entry_delete(&self, tenant: &TenantId, id: &str) -> Result<u64>;

    /// Search entries with pagination
    async fn entry_search(
        &self,
        tenant: &TenantId,
        filter: &EntryFilter,
        offset: u64,
        limit: u64,
    ) -> Result<EntryPage>;
}

#[async_trait]
impl EntryPersistence for ConfigEntryStore {
    async fn entry_create(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entry: ConfigEntry,
    ) -> Result<ConfigEntry> {
        self.create(tenant, caller, entry).await
    }

    async fn entry_create_batch(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entries: Vec<ConfigEntry>,
    ) -> Result<Vec<ConfigEntry>> {
        self.create_batch(tenant, caller, entries).await
    }

    async fn entry_find(&self, tenant: &TenantId, id: &str) -> Result<Option<ConfigEntry>> {
        self.get(tenant, id).await
    }

    async fn entry_update(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        id: &str,
        entry: ConfigEntry,
    ) -> Result<bool> {
        self.update(tenant, caller, id, entry).await
    }

    async fn entry_delete(&self, tenant: &TenantId, id: &str) -> Result<u64> {
        self.delete(tenant, id).await
    }

    async fn entry_search(
        &self,
        tenant: &TenantId,
        filter: &EntryFilter,
        offset: u64,
        limit: u64,
    ) -> Result<EntryPage> {
        self.search(tenant, filter, offset, limit).await
    }
}
