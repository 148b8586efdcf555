//! Configuration entry store
//!
//! CRUD and search over `config_data`, built on the storage client. Every
//! write passes the validation gate first; ids and metadata are assigned here.

use chrono::{DateTime, SubsecRound, Utc};
use confstore_common::{ConfigEntry, EntryFilter, EntryPage, Metadata, TenantId};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DbBackend, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Statement,
};
use tracing::debug;
use uuid::Uuid;

use crate::client::StorageClient;
use crate::entity::config_data;
use crate::error::{Result, StoreError};
use crate::transaction::Mutation;
use crate::validation::{WriteContext, validate_for_create, validate_for_update};

#[derive(Debug, FromQueryResult)]
struct TotalRow {
    total: i64,
}

#[derive(Clone)]
pub struct ConfigEntryStore {
    client: StorageClient,
}

impl ConfigEntryStore {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &StorageClient {
        &self.client
    }

    /// Validate and insert an entry, returning it with its assigned id and metadata
    pub async fn create(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entry: ConfigEntry,
    ) -> Result<ConfigEntry> {
        validate_for_create(&entry, caller)?;
        let model = new_model(entry, caller, now());

        let outcome = self
            .client
            .execute_statement(tenant, insert_statement(&self.client, &model))
            .await?;
        debug!(
            tenant = %tenant,
            id = %model.id,
            returned = ?outcome.inserted_id(),
            "Config entry created"
        );
        Ok(model.into())
    }

    /// Insert every entry in one transaction; none are stored if any fails
    pub async fn create_batch(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        entries: Vec<ConfigEntry>,
    ) -> Result<Vec<ConfigEntry>> {
        for (index, entry) in entries.iter().enumerate() {
            validate_for_create(entry, caller).map_err(|e| StoreError::Batch {
                index,
                label: format!("validate {}/{}", entry.module, entry.config_name),
                source: Box::new(e.into()),
            })?;
        }

        let created_at = now();
        let models: Vec<config_data::Model> = entries
            .into_iter()
            .map(|entry| new_model(entry, caller, created_at))
            .collect();
        let work = models
            .iter()
            .map(|model| {
                Mutation::from_statement(
                    format!("insert {}/{}", model.module, model.config_name),
                    insert_statement(&self.client, model),
                )
            })
            .collect();

        self.client.run_in_transaction(tenant, work).await?;
        Ok(models.into_iter().map(ConfigEntry::from).collect())
    }

    pub async fn get(&self, tenant: &TenantId, id: &str) -> Result<Option<ConfigEntry>> {
        let stmt = config_data::Entity::find_by_id(id.to_string()).build(self.client.backend());
        let models: Vec<config_data::Model> = self.client.query_as(tenant, stmt).await?;
        Ok(models.into_iter().next().map(ConfigEntry::from))
    }

    /// Replace the entry stored under `id`; `false` when no such entry exists
    ///
    /// The creation half of the metadata is preserved.
    pub async fn update(
        &self,
        tenant: &TenantId,
        caller: &WriteContext,
        id: &str,
        entry: ConfigEntry,
    ) -> Result<bool> {
        validate_for_update(id, &entry, caller)?;

        let supplied = supplied_metadata(&entry, caller);
        let changes = config_data::ActiveModel {
            module: Set(entry.module),
            config_name: Set(entry.config_name),
            code: Set(entry.code),
            description: Set(entry.description),
            is_default: Set(entry.default),
            enabled: Set(entry.enabled),
            value: Set(entry.value),
            updated_by_user_id: Set(supplied
                .updated_by_user_id
                .or_else(|| caller.user_id.map(|u| u.to_string()))),
            updated_date: Set(Some(supplied.updated_date.unwrap_or_else(now))),
            ..Default::default()
        };
        let stmt = config_data::Entity::update_many()
            .set(changes)
            .filter(config_data::Column::Id.eq(id))
            .build(self.client.backend());

        let outcome = self.client.execute_statement(tenant, stmt).await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Delete the entry stored under `id`, returning the number of rows removed
    pub async fn delete(&self, tenant: &TenantId, id: &str) -> Result<u64> {
        let stmt = config_data::Entity::delete_many()
            .filter(config_data::Column::Id.eq(id))
            .build(self.client.backend());
        let outcome = self.client.execute_statement(tenant, stmt).await?;
        Ok(outcome.rows_affected())
    }

    /// One page of entries matching `filter`, ordered by module and name
    pub async fn search(
        &self,
        tenant: &TenantId,
        filter: &EntryFilter,
        offset: u64,
        limit: u64,
    ) -> Result<EntryPage> {
        let backend = self.client.backend();
        let condition = filter_condition(filter);

        let count = count_statement(condition.clone(), backend);
        let total = self
            .client
            .query_as::<TotalRow>(tenant, count)
            .await?
            .first()
            .map_or(0, |row| row.total.max(0) as u64);

        let page = config_data::Entity::find()
            .filter(condition)
            .order_by_asc(config_data::Column::Module)
            .order_by_asc(config_data::Column::ConfigName)
            .order_by_asc(config_data::Column::Id)
            .offset(offset)
            .limit(limit)
            .build(backend);
        let models: Vec<config_data::Model> = self.client.query_as(tenant, page).await?;

        Ok(EntryPage {
            entries: models.into_iter().map(ConfigEntry::from).collect(),
            total_records: total,
        })
    }

    pub async fn health_check(&self, tenant: &TenantId) -> Result<()> {
        self.client.health_check(tenant).await
    }
}

/// Timestamps are truncated to microseconds, the finest precision both engines keep
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn supplied_metadata(entry: &ConfigEntry, caller: &WriteContext) -> Metadata {
    if caller.is_system() {
        entry.metadata.clone().unwrap_or_default()
    } else {
        Metadata::default()
    }
}

fn new_model(entry: ConfigEntry, caller: &WriteContext, now: DateTime<Utc>) -> config_data::Model {
    let supplied = supplied_metadata(&entry, caller);
    let user = caller.user_id.map(|u| u.to_string());
    let id = entry
        .id
        .filter(|_| caller.is_system())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    config_data::Model {
        id,
        module: entry.module,
        config_name: entry.config_name,
        code: entry.code,
        description: entry.description,
        is_default: entry.default,
        enabled: entry.enabled,
        value: entry.value,
        created_by_user_id: supplied.created_by_user_id.or_else(|| user.clone()),
        created_date: supplied.created_date.unwrap_or(now),
        updated_by_user_id: supplied.updated_by_user_id.or(user),
        updated_date: Some(supplied.updated_date.unwrap_or(now)),
    }
}

fn insert_statement(client: &StorageClient, model: &config_data::Model) -> Statement {
    let active = config_data::ActiveModel {
        id: Set(model.id.clone()),
        module: Set(model.module.clone()),
        config_name: Set(model.config_name.clone()),
        code: Set(model.code.clone()),
        description: Set(model.description.clone()),
        is_default: Set(model.is_default),
        enabled: Set(model.enabled),
        value: Set(model.value.clone()),
        created_by_user_id: Set(model.created_by_user_id.clone()),
        created_date: Set(model.created_date),
        updated_by_user_id: Set(model.updated_by_user_id.clone()),
        updated_date: Set(model.updated_date),
    };
    let mut insert = config_data::Entity::insert(active);
    QueryTrait::query(&mut insert).returning_col(config_data::Column::Id);
    insert.build(client.backend())
}

fn count_statement(condition: Condition, backend: DbBackend) -> Statement {
    config_data::Entity::find()
        .select_only()
        .column_as(Expr::col(config_data::Column::Id).count(), "total")
        .filter(condition)
        .build(backend)
}

fn filter_condition(filter: &EntryFilter) -> Condition {
    Condition::all()
        .add_option(
            filter
                .module
                .as_ref()
                .map(|m| config_data::Column::Module.eq(m.as_str())),
        )
        .add_option(
            filter
                .config_name
                .as_ref()
                .map(|n| config_data::Column::ConfigName.eq(n.as_str())),
        )
        .add_option(
            filter
                .code
                .as_ref()
                .map(|c| config_data::Column::Code.eq(c.as_str())),
        )
        .add_option(filter.enabled.map(|e| config_data::Column::Enabled.eq(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    const USER: &str = "2b94c631-fca9-a892-c730-03ee529ffe2a";

    #[test]
    fn test_new_model_assigns_id_and_metadata() {
        let user = Uuid::parse_str(USER).unwrap();
        let at = now();
        let entry = ConfigEntry::new("CIRCULATION", "validation_rules").with_value("{}");
        let model = new_model(entry, &WriteContext::client(Some(user)), at);

        assert!(Uuid::parse_str(&model.id).is_ok());
        assert_eq!(model.created_by_user_id.as_deref(), Some(USER));
        assert_eq!(model.updated_by_user_id.as_deref(), Some(USER));
        assert_eq!(model.created_date, at);
        assert_eq!(model.updated_date, Some(at));
    }

    #[test]
    fn test_new_model_keeps_system_supplied_fields() {
        let id = Uuid::new_v4().to_string();
        let earlier = now() - chrono::Duration::days(1);
        let mut entry = ConfigEntry::new("CIRCULATION", "loans");
        entry.id = Some(id.clone());
        entry.metadata = Some(Metadata {
            created_by_user_id: Some(USER.to_string()),
            created_date: Some(earlier),
            ..Default::default()
        });

        let model = new_model(entry, &WriteContext::system(None), now());
        assert_eq!(model.id, id);
        assert_eq!(model.created_date, earlier);
        assert_eq!(model.created_by_user_id.as_deref(), Some(USER));
        assert!(model.updated_by_user_id.is_none());
    }

    #[test]
    fn test_insert_statement_returns_id() {
        let client = StorageClient::new(StorageConfig::default()).unwrap();
        let model = new_model(
            ConfigEntry::new("CIRCULATION", "loans"),
            &WriteContext::default(),
            now(),
        );
        let stmt = insert_statement(&client, &model);
        assert_eq!(stmt.db_backend, DbBackend::Postgres);
        assert!(stmt.sql.starts_with(r#"INSERT INTO "config_data""#));
        assert!(stmt.sql.ends_with(r#"RETURNING "id""#));
        assert!(!stmt.sql.contains("CIRCULATION"));
    }

    #[test]
    fn test_count_statement_selects_total() {
        let filter = EntryFilter::default().module("CIRCULATION");
        let stmt = count_statement(filter_condition(&filter), DbBackend::Sqlite);
        assert!(stmt.sql.starts_with("SELECT COUNT("));
        assert!(stmt.sql.contains(r#"AS "total" FROM "config_data""#));
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(1));
    }

    #[test]
    fn test_filter_condition_binds_values() {
        let filter = EntryFilter::default().module("CIRCULATION").enabled(true);
        let stmt = config_data::Entity::find()
            .filter(filter_condition(&filter))
            .build(DbBackend::Postgres);
        assert!(stmt.sql.contains(r#""module" = $1"#));
        assert!(stmt.sql.contains(r#""enabled" = $2"#));
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(2));
    }
}
