//! confstore Common - Shared types, error codes, and utilities
//!
//! This crate provides the foundational types used across all confstore components:
//! - Error codes and the tenant id error type
//! - Configuration entry model and its JSON boundary
//! - Tenant identifiers and namespace naming
//! - Identifier and encoding helpers

pub mod error;
pub mod model;
pub mod tenant;
pub mod utils;

// Re-exports for convenience
pub use error::{CommonError, ErrorCode};
pub use model::{ConfigEntry, EntryFilter, EntryPage, Metadata};
pub use tenant::TenantId;
pub use utils::{decode_base64, encode_base64, is_identifier};

/// Module suffix appended to the tenant id to form the namespace name
pub const DEFAULT_MODULE: &str = "mod_configuration";

/// Name of the base table holding configuration entries in every namespace
pub const CONFIG_TABLE: &str = "config_data";
