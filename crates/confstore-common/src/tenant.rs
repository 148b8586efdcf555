//! Tenant identifiers
//!
//! Tenant ids are spliced into schema and file names, so they are validated
//! once on construction and carried as a newtype afterwards.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

static TENANT_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-z][a-z0-9_]{0,47}$").expect("Invalid regex pattern"));

/// Validated tenant identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, rejecting anything that is not a lowercase identifier
    pub fn new(id: impl Into<String>) -> Result<Self, CommonError> {
        let id = id.into();
        if TENANT_PATTERN.is_match(&id) {
            Ok(Self(id))
        } else {
            Err(CommonError::InvalidTenant(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace (schema) name for this tenant, e.g. `harvard_mod_configuration`
    pub fn schema_name(&self, module: &str) -> String {
        format!("{}_{}", self.0, module)
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_valid() {
        let tenant = TenantId::new("harvard").unwrap();
        assert_eq!(tenant.as_str(), "harvard");
        assert_eq!(
            tenant.schema_name("mod_configuration"),
            "harvard_mod_configuration"
        );
        assert!(TenantId::new("diku_2").is_ok());
    }

    #[test]
    fn test_tenant_id_invalid() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("Harvard").is_err());
        assert!(TenantId::new("9lives").is_err());
        assert!(TenantId::new("a-b").is_err());
        assert!(TenantId::new("x\"; drop schema public").is_err());
        assert!(TenantId::new("t".repeat(49)).is_err());
    }

    #[test]
    fn test_tenant_id_serde() {
        let tenant: TenantId = serde_json::from_str("\"diku\"").unwrap();
        assert_eq!(tenant.to_string(), "diku");
        assert!(serde_json::from_str::<TenantId>("\"Not Valid\"").is_err());
        assert_eq!(serde_json::to_string(&tenant).unwrap(), "\"diku\"");
    }
}
