//! Configuration entry model
//!
//! These types are the wire shape of a configuration entry. They are
//! deliberately decoupled from the storage entity so that client payloads can
//! be inspected by the validation gate before anything touches the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommonError;
use crate::utils::decode_base64;

/// System-assigned audit information for an entry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<DateTime<Utc>>,
}

impl Metadata {
    /// True when no field of the block carries a value
    pub fn is_empty(&self) -> bool {
        self.created_by_user_id.is_none()
            && self.created_date.is_none()
            && self.updated_by_user_id.is_none()
            && self.updated_date.is_none()
    }
}

fn default_enabled() -> bool {
    true
}

/// A named configuration record scoped to one tenant
///
/// `module` and `config_name` default to empty strings on deserialization so
/// that a missing field is reported by the validation gate as a field-level
/// violation instead of a parse failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub config_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Default for ConfigEntry {
    fn default() -> Self {
        Self {
            id: None,
            module: String::new(),
            config_name: String::new(),
            code: None,
            description: None,
            default: false,
            enabled: true,
            value: String::new(),
            metadata: None,
        }
    }
}

impl ConfigEntry {
    pub fn new(module: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            config_name: config_name.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Parse a client payload
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Render the entry in its wire shape
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode the value as base64 binary content
    pub fn decoded_value(&self) -> Result<Vec<u8>, CommonError> {
        decode_base64(&self.value)
    }

    /// True when the client sent a metadata block with at least one field set
    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// Search filter for configuration entries; `None` fields match everything
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    pub module: Option<String>,
    pub config_name: Option<String>,
    pub code: Option<String>,
    pub enabled: Option<bool>,
}

impl EntryFilter {
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn config_name(mut self, config_name: impl Into<String>) -> Self {
        self.config_name = Some(config_name.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// One page of a filtered search plus the total number of matches
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    #[serde(rename = "configs")]
    pub entries: Vec<ConfigEntry>,
    pub total_records: u64,
}
