//! Storage error taxonomy
//!
//! Every failure surfaced by this crate is one of the `StoreError` variants.
//! Driver errors are classified here so that callers never match on sea-orm
//! or sqlx types, and query errors never carry bound parameter values.

use confstore_common::error::{
    CONNECTION_ERROR, DATA_ACCESS_ERROR, ILLEGAL_STATE, PARAMETER_VALIDATE_ERROR,
    RESOURCE_CONFLICT, RESOURCE_NOT_FOUND, SERVER_ERROR, TENANT_PARAM_ERROR,
};
use confstore_common::{CommonError, ErrorCode, TenantId};
use sea_orm::{DbErr, RuntimeErr, sqlx};

use crate::session::SessionError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable for tenant '{tenant}': {reason}")]
    Connection { tenant: String, reason: String },

    #[error("{intent} failed: {reason}")]
    Query { intent: String, reason: String },

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("cache table '{0}' already exists")]
    CacheNameConflict(String),

    #[error("cache table '{0}' does not exist")]
    CacheNotFound(String),

    #[error("'{0}' is not a valid cache table name")]
    InvalidCacheName(String),

    #[error(transparent)]
    InvalidTenant(#[from] CommonError),

    #[error("transaction misuse: {0}")]
    TransactionMisuse(String),

    #[error("batch operation #{index} ({label}) failed: {source}")]
    Batch {
        index: usize,
        label: String,
        source: Box<StoreError>,
    },

    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Classify a driver error raised while running `intent` for `tenant`
    pub fn from_db(err: DbErr, tenant: &TenantId, intent: &str) -> Self {
        if is_connection_failure(&err) {
            return StoreError::Connection {
                tenant: tenant.to_string(),
                reason: err.to_string(),
            };
        }
        StoreError::Query {
            intent: intent.to_string(),
            reason: query_reason(&err),
        }
    }

    /// Classify a session failure; a statement stopped at its deadline is a
    /// timeout whichever side stopped it
    pub(crate) fn from_session(
        err: SessionError,
        tenant: &TenantId,
        intent: &str,
        limit: std::time::Duration,
    ) -> Self {
        match err {
            SessionError::Db(e) if !is_statement_cancelled(&e) => Self::from_db(e, tenant, intent),
            _ => Self::timed_out(tenant, intent, limit),
        }
    }

    pub(crate) fn timed_out(tenant: &TenantId, intent: &str, limit: std::time::Duration) -> Self {
        StoreError::Connection {
            tenant: tenant.to_string(),
            reason: format!("{intent} timed out after {}ms", limit.as_millis()),
        }
    }

    /// The innermost error, unwrapping batch context
    pub fn root_cause(&self) -> &StoreError {
        match self {
            StoreError::Batch { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self.root_cause() {
            StoreError::Connection { .. } => CONNECTION_ERROR,
            StoreError::Query { .. } => DATA_ACCESS_ERROR,
            StoreError::Validation(_) | StoreError::InvalidCacheName(_) => {
                PARAMETER_VALIDATE_ERROR
            }
            StoreError::CacheNameConflict(_) => RESOURCE_CONFLICT,
            StoreError::CacheNotFound(_) => RESOURCE_NOT_FOUND,
            StoreError::InvalidTenant(_) => TENANT_PARAM_ERROR,
            StoreError::TransactionMisuse(_) => ILLEGAL_STATE,
            StoreError::Config(_) | StoreError::Batch { .. } => SERVER_ERROR,
        }
    }

    /// HTTP status a boundary layer should answer with
    pub fn status_hint(&self) -> u16 {
        match self.root_cause() {
            StoreError::Validation(_) => 422,
            StoreError::InvalidCacheName(_) | StoreError::InvalidTenant(_) => 400,
            StoreError::CacheNotFound(_) => 404,
            StoreError::CacheNameConflict(_) => 409,
            StoreError::Connection { .. } => 503,
            _ => 500,
        }
    }
}

fn is_connection_failure(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        }
        _ => false,
    }
}

/// SQLSTATE (PostgreSQL) or extended result code (SQLite) of a database error
pub(crate) fn sql_state(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db))) => {
            db.code().map(|code| code.into_owned())
        }
        _ => None,
    }
}

/// Driver message with quoted text blanked out, plus the engine's error code.
/// PostgreSQL echoes offending bound values inside double quotes.
fn query_reason(err: &DbErr) -> String {
    let message = redact_quoted(&err.to_string());
    match sql_state(err) {
        Some(code) => format!("{message} (code {code})"),
        None => message,
    }
}

fn redact_quoted(message: &str) -> String {
    let mut redacted = String::with_capacity(message.len());
    let mut open: Option<char> = None;
    for c in message.chars() {
        match open {
            Some(quote) if c == quote => {
                redacted.push(c);
                open = None;
            }
            Some(_) => {}
            None if c == '"' || c == '\'' => {
                redacted.push(c);
                redacted.push('?');
                open = Some(c);
            }
            None => redacted.push(c),
        }
    }
    redacted
}

/// The engine stopped the statement at its deadline: PostgreSQL
/// `query_canceled` (57014) or SQLite `SQLITE_INTERRUPT` (9)
pub(crate) fn is_statement_cancelled(err: &DbErr) -> bool {
    matches!(sql_state(err).as_deref(), Some("57014" | "9"))
}

/// Duplicate schema (42P06), duplicate table (42P07) or a concurrent catalog
/// insert (23505); SQLite only reports these through the message.
pub(crate) fn is_already_exists(err: &DbErr) -> bool {
    matches!(sql_state(err).as_deref(), Some("42P06" | "42P07" | "23505"))
        || err.to_string().contains("already exists")
}

/// Undefined table (42P01) or SQLite's "no such table"
pub(crate) fn is_undefined_table(err: &DbErr) -> bool {
    sql_state(err).as_deref() == Some("42P01") || err.to_string().contains("no such table")
}
