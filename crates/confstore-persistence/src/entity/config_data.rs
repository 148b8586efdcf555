//! Configuration entry entity
//!
//! One row per entry in the tenant namespace's `config_data` table.

use confstore_common::{ConfigEntry, Metadata};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "config_data")]
pub struct Model {
    /// UUID assigned by the store
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub module: String,
    pub config_name: String,
    #[sea_orm(nullable)]
    pub code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub is_default: bool,
    pub enabled: bool,
    /// Free text, often a JSON document or base64 content
    #[sea_orm(column_type = "Text")]
    pub value: String,
    #[sea_orm(nullable)]
    pub created_by_user_id: Option<String>,
    pub created_date: DateTimeUtc,
    #[sea_orm(nullable)]
    pub updated_by_user_id: Option<String>,
    #[sea_orm(nullable)]
    pub updated_date: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ConfigEntry {
    fn from(model: Model) -> Self {
        ConfigEntry {
            id: Some(model.id),
            module: model.module,
            config_name: model.config_name,
            code: model.code,
            description: model.description,
            default: model.is_default,
            enabled: model.enabled,
            value: model.value,
            metadata: Some(Metadata {
                created_by_user_id: model.created_by_user_id,
                created_date: Some(model.created_date),
                updated_by_user_id: model.updated_by_user_id,
                updated_date: model.updated_date,
            }),
        }
    }
}
