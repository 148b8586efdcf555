//! Subcommand handlers
//!
//! Results are printed to stdout as pretty JSON; logs go to stderr.

use std::path::Path;

use anyhow::Context;
use confstore_common::{ConfigEntry, EntryFilter, TenantId};
use confstore_persistence::{ConfigEntryStore, StoreError, WriteContext};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::cli::Command;

/// Accepted import file shapes: a bare array or a search-result page
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Entries(Vec<ConfigEntry>),
    Page { configs: Vec<ConfigEntry> },
}

impl ImportFile {
    fn into_entries(self) -> Vec<ConfigEntry> {
        match self {
            ImportFile::Entries(entries) | ImportFile::Page { configs: entries } => entries,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_import_file(path: &Path) -> anyhow::Result<Vec<ConfigEntry>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: ImportFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a list of config entries", path.display()))?;
    Ok(file.into_entries())
}

/// Run one subcommand against the tenant
pub async fn run(command: Command, tenant: &TenantId, store: &ConfigEntryStore) -> anyhow::Result<()> {
    let client = store.client();
    match command {
        Command::Bootstrap => {
            let status = client.ensure_namespace(tenant).await?;
            info!(tenant = %tenant, status = ?status, "Bootstrap finished");
            print_json(&json!({
                "tenant": tenant,
                "namespace": client.schema_name(tenant),
                "status": format!("{status:?}"),
            }))
        }
        Command::Health => {
            store.health_check(tenant).await?;
            print_json(&json!({ "tenant": tenant, "status": "UP" }))
        }
        Command::Import { file, user } => {
            let entries = read_import_file(&file).await?;
            let total = entries.len();
            let created = store
                .create_batch(tenant, &WriteContext::client(user), entries)
                .await?;
            info!(tenant = %tenant, entries = total, "Import committed");
            print_json(&created)
        }
        Command::Get { id } => match store.get(tenant, &id).await? {
            Some(entry) => print_json(&entry),
            None => anyhow::bail!("config entry '{}' not found", id),
        },
        Command::Search {
            module,
            config_name,
            code,
            offset,
            limit,
        } => {
            let filter = EntryFilter {
                module,
                config_name,
                code,
                enabled: None,
            };
            print_json(&store.search(tenant, &filter, offset, limit).await?)
        }
        Command::Delete { id } => {
            let deleted = store.delete(tenant, &id).await?;
            print_json(&json!({ "id": id, "deleted": deleted }))
        }
        Command::Materialize { name, query } => {
            print_json(&client.materialize(tenant, &name, &query).await?)
        }
        Command::Evict { name } => {
            client.evict(tenant, &name).await?;
            print_json(&json!({ "name": name, "evicted": true }))
        }
    }
}

/// Error body for a failed command, when the failure came from storage
pub fn error_body(err: &anyhow::Error) -> Option<serde_json::Value> {
    let store_err = err.downcast_ref::<StoreError>()?;
    let code = store_err.error_code();
    Some(json!({
        "code": code.code,
        "message": code.message,
        "status": store_err.status_hint(),
        "detail": store_err.to_string(),
    }))
}
