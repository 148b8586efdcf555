//! Validation gate for entry writes
//!
//! Runs before any statement is issued. Client callers may not supply the
//! id, which is assigned by the store. A metadata block from any caller must
//! be internally consistent with system assignment; the store only keeps
//! metadata supplied by system callers.

use std::borrow::Cow;

use confstore_common::ConfigEntry;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

/// Maximum length for module, configName and code
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length for description
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;

/// Maximum length for value (1MB)
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024;

/// Who is asking for the write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trust {
    /// An external client; system fields are read-only
    #[default]
    Client,
    /// An internal component allowed to set ids and metadata
    System,
}

/// Caller context handed to every write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteContext {
    pub user_id: Option<Uuid>,
    pub trust: Trust,
}

impl WriteContext {
    pub fn client(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            trust: Trust::Client,
        }
    }

    pub fn system(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            trust: Trust::System,
        }
    }

    pub fn is_system(&self) -> bool {
        self.trust == Trust::System
    }
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn finish(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate an entry about to be created
pub fn validate_for_create(entry: &ConfigEntry, caller: &WriteContext) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_fields(entry, &mut errors);

    if let Some(id) = &entry.id {
        if !caller.is_system() {
            errors.add("id", violation("read_only", "id is assigned by the store"));
        } else if Uuid::parse_str(id).is_err() {
            errors.add("id", violation("invalid_uuid", "id must be a UUID"));
        }
    }

    check_metadata(entry, &mut errors);
    finish(errors)
}

/// Validate a replacement for the entry stored under `id`
pub fn validate_for_update(
    id: &str,
    entry: &ConfigEntry,
    _caller: &WriteContext,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_fields(entry, &mut errors);

    if let Some(body_id) = &entry.id
        && body_id != id
    {
        errors.add("id", violation("mismatch", "id in body does not match the entry being updated"));
    }

    check_metadata(entry, &mut errors);
    finish(errors)
}

fn check_fields(entry: &ConfigEntry, errors: &mut ValidationErrors) {
    if entry.module.trim().is_empty() {
        errors.add("module", violation("required", "module may not be empty"));
    } else if entry.module.len() > MAX_NAME_LENGTH {
        errors.add("module", violation("too_long", "module exceeds 255 characters"));
    }

    if entry.config_name.trim().is_empty() {
        errors.add("configName", violation("required", "configName may not be empty"));
    } else if entry.config_name.len() > MAX_NAME_LENGTH {
        errors.add("configName", violation("too_long", "configName exceeds 255 characters"));
    }

    if entry.code.as_ref().is_some_and(|c| c.len() > MAX_NAME_LENGTH) {
        errors.add("code", violation("too_long", "code exceeds 255 characters"));
    }
    if entry
        .description
        .as_ref()
        .is_some_and(|d| d.len() > MAX_DESCRIPTION_LENGTH)
    {
        errors.add("description", violation("too_long", "description exceeds 4096 characters"));
    }
    if entry.value.len() > MAX_VALUE_LENGTH {
        errors.add("value", violation("too_long", "value exceeds 1MB"));
    }
}

fn check_metadata(entry: &ConfigEntry, errors: &mut ValidationErrors) {
    let Some(metadata) = entry.metadata.as_ref().filter(|m| !m.is_empty()) else {
        return;
    };

    if metadata
        .created_by_user_id
        .as_deref()
        .is_some_and(|u| Uuid::parse_str(u).is_err())
    {
        errors.add(
            "metadata.createdByUserId",
            violation("invalid_uuid", "createdByUserId must be a UUID"),
        );
    }
    if metadata
        .updated_by_user_id
        .as_deref()
        .is_some_and(|u| Uuid::parse_str(u).is_err())
    {
        errors.add(
            "metadata.updatedByUserId",
            violation("invalid_uuid", "updatedByUserId must be a UUID"),
        );
    }
    if let (Some(created), Some(updated)) = (metadata.created_date, metadata.updated_date)
        && updated < created
    {
        errors.add(
            "metadata.updatedDate",
            violation("inconsistent", "updatedDate precedes createdDate"),
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use confstore_common::Metadata;

    use super::*;

    const USER: &str = "2b94c631-fca9-a892-c730-03ee529ffe2a";

    fn code_of(errors: &ValidationErrors, field: &str) -> Option<String> {
        errors
            .field_errors()
            .get(field)
            .and_then(|list| list.first())
            .map(|e| e.code.to_string())
    }

    fn entry() -> ConfigEntry {
        ConfigEntry::new("CIRCULATION", "validation_rules").with_value("{}")
    }

    #[test]
    fn test_valid_client_entry() {
        assert!(validate_for_create(&entry(), &WriteContext::client(None)).is_ok());
    }

    #[test]
    fn test_client_metadata_must_be_consistent() {
        let mut e = entry();
        e.metadata = Some(Metadata {
            created_by_user_id: Some("123456".to_string()),
            ..Default::default()
        });
        let errors = validate_for_create(&e, &WriteContext::client(None)).unwrap_err();
        assert_eq!(
            code_of(&errors, "metadata.createdByUserId").as_deref(),
            Some("invalid_uuid")
        );
    }

    #[test]
    fn test_consistent_client_metadata_accepted() {
        let now = Utc::now();
        let mut e = entry();
        e.metadata = Some(Metadata {
            created_by_user_id: Some(USER.to_string()),
            created_date: Some(now),
            updated_date: Some(now),
            ..Default::default()
        });
        assert!(validate_for_create(&e, &WriteContext::client(None)).is_ok());
    }

    #[test]
    fn test_empty_metadata_block_is_ignored() {
        let mut e = entry();
        e.metadata = Some(Metadata::default());
        assert!(validate_for_create(&e, &WriteContext::client(None)).is_ok());
    }

    #[test]
    fn test_system_metadata_must_be_consistent() {
        let now = Utc::now();
        let mut e = entry();
        e.metadata = Some(Metadata {
            created_by_user_id: Some(USER.to_string()),
            created_date: Some(now),
            updated_by_user_id: Some("123456".to_string()),
            updated_date: Some(now - Duration::hours(1)),
        });
        let errors = validate_for_create(&e, &WriteContext::system(None)).unwrap_err();
        assert_eq!(
            code_of(&errors, "metadata.updatedByUserId").as_deref(),
            Some("invalid_uuid")
        );
        assert_eq!(
            code_of(&errors, "metadata.updatedDate").as_deref(),
            Some("inconsistent")
        );
        assert!(code_of(&errors, "metadata.createdByUserId").is_none());
    }

    #[test]
    fn test_system_metadata_accepted() {
        let now = Utc::now();
        let mut e = entry();
        e.id = Some(Uuid::new_v4().to_string());
        e.metadata = Some(Metadata {
            created_by_user_id: Some(USER.to_string()),
            created_date: Some(now),
            updated_by_user_id: Some(USER.to_string()),
            updated_date: Some(now),
        });
        assert!(validate_for_create(&e, &WriteContext::system(None)).is_ok());
    }

    #[test]
    fn test_id_rules_on_create() {
        let mut e = entry();
        e.id = Some(Uuid::new_v4().to_string());
        let errors = validate_for_create(&e, &WriteContext::client(None)).unwrap_err();
        assert_eq!(code_of(&errors, "id").as_deref(), Some("read_only"));

        e.id = Some("123456".to_string());
        let errors = validate_for_create(&e, &WriteContext::system(None)).unwrap_err();
        assert_eq!(code_of(&errors, "id").as_deref(), Some("invalid_uuid"));
    }

    #[test]
    fn test_required_and_length() {
        let mut e = ConfigEntry::new("", "  ");
        e.code = Some("c".repeat(MAX_NAME_LENGTH + 1));
        let errors = validate_for_create(&e, &WriteContext::client(None)).unwrap_err();
        assert_eq!(code_of(&errors, "module").as_deref(), Some("required"));
        assert_eq!(code_of(&errors, "configName").as_deref(), Some("required"));
        assert_eq!(code_of(&errors, "code").as_deref(), Some("too_long"));
    }

    #[test]
    fn test_update_id_mismatch() {
        let id = Uuid::new_v4().to_string();
        let mut e = entry();
        e.id = Some(id.clone());
        assert!(validate_for_update(&id, &e, &WriteContext::client(None)).is_ok());

        e.id = Some(Uuid::new_v4().to_string());
        let errors = validate_for_update(&id, &e, &WriteContext::client(None)).unwrap_err();
        assert_eq!(code_of(&errors, "id").as_deref(), Some("mismatch"));
    }
}
