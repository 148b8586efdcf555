//! Query and mutation executor
//!
//! Statements are classified by their leading keyword: reads come back as
//! rows, inserts report the generated key when the statement has a
//! `RETURNING` clause (or, on SQLite, the rowid of the inserted row), and
//! everything else reports the affected row count. Every call is bounded by
//! the client's statement timeout, which the engine enforces.

use std::fmt::{Display, Formatter};

use confstore_common::TenantId;
use sea_orm::{DatabaseConnection, DbErr, FromQueryResult, QueryResult, Statement, Value};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::client::StorageClient;
use crate::error::{Result, StoreError};
use crate::session::{Session, SessionError};

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, JsonValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .trim_start_matches('(')
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Other => "statement",
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a statement produced
#[derive(Clone, Debug, PartialEq)]
pub enum ExecOutcome {
    Rows(Vec<Row>),
    Inserted {
        id: Option<JsonValue>,
        rows_affected: u64,
    },
    RowsAffected(u64),
}

impl ExecOutcome {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            ExecOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ExecOutcome::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn inserted_id(&self) -> Option<&JsonValue> {
        match self {
            ExecOutcome::Inserted { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Rows returned for reads, rows touched for writes
    pub fn rows_affected(&self) -> u64 {
        match self {
            ExecOutcome::Rows(rows) => rows.len() as u64,
            ExecOutcome::Inserted { rows_affected, .. } => *rows_affected,
            ExecOutcome::RowsAffected(n) => *n,
        }
    }
}

fn has_returning(sql: &str) -> bool {
    sql.to_ascii_uppercase()
        .split_whitespace()
        .any(|word| word == "RETURNING")
}

fn into_row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

fn decode_rows(results: &[QueryResult]) -> std::result::Result<Vec<Row>, DbErr> {
    results
        .iter()
        .map(|result| JsonValue::from_query_result(result, "").map(into_row))
        .collect()
}

/// The `id` column of the first returned row, or its first column
fn returned_id(rows: &[Row]) -> Option<JsonValue> {
    rows.first()
        .and_then(|row| row.get("id").or_else(|| row.values().next()))
        .cloned()
}

/// Run one statement on a session
pub(crate) async fn run_statement(
    session: &mut Session,
    stmt: &Statement,
) -> std::result::Result<ExecOutcome, SessionError> {
    match StatementKind::classify(&stmt.sql) {
        StatementKind::Select => {
            let rows = decode_rows(&session.fetch(stmt).await?)?;
            Ok(ExecOutcome::Rows(rows))
        }
        StatementKind::Insert if has_returning(&stmt.sql) => {
            let rows = decode_rows(&session.fetch(stmt).await?)?;
            Ok(ExecOutcome::Inserted {
                id: returned_id(&rows),
                rows_affected: rows.len() as u64,
            })
        }
        StatementKind::Insert => {
            let done = session.execute(stmt).await?;
            Ok(ExecOutcome::Inserted {
                id: done
                    .last_insert_rowid
                    .filter(|_| done.rows_affected > 0)
                    .map(JsonValue::from),
                rows_affected: done.rows_affected,
            })
        }
        _ => Ok(ExecOutcome::RowsAffected(session.execute(stmt).await?.rows_affected)),
    }
}

impl StorageClient {
    /// Execute raw SQL with positional parameters in the engine's placeholder
    /// syntax (`$1` for PostgreSQL, `?` for SQLite)
    pub async fn execute(
        &self,
        tenant: &TenantId,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecOutcome> {
        let stmt = Statement::from_sql_and_values(self.backend(), sql, params);
        self.execute_statement(tenant, stmt).await
    }

    /// Execute a prepared statement against the tenant's pool
    pub async fn execute_statement(&self, tenant: &TenantId, stmt: Statement) -> Result<ExecOutcome> {
        let db = self.connection(tenant).await?;
        let kind = StatementKind::classify(&stmt.sql);
        debug!(tenant = %tenant, kind = %kind, "Executing statement");

        let mut session = self.checkout(&db, tenant).await?;
        let result = run_statement(&mut session, &stmt).await;
        self.settle(session, result, tenant, kind.as_str())
    }

    /// Run a read and decode each row into `M`
    pub async fn query_as<M>(&self, tenant: &TenantId, stmt: Statement) -> Result<Vec<M>>
    where
        M: FromQueryResult + Send + Sync,
    {
        let db = self.connection(tenant).await?;
        self.fetch_on(&db, tenant, "select", &stmt).await
    }

    /// Run a read on the given pool without provisioning first
    pub(crate) async fn fetch_on<M: FromQueryResult>(
        &self,
        db: &DatabaseConnection,
        tenant: &TenantId,
        intent: &str,
        stmt: &Statement,
    ) -> Result<Vec<M>> {
        let mut session = self.checkout(db, tenant).await?;
        let result = match session.fetch(stmt).await {
            Ok(rows) => rows
                .iter()
                .map(|row| M::from_query_result(row, ""))
                .collect::<std::result::Result<Vec<M>, DbErr>>()
                .map_err(SessionError::Db),
            Err(e) => Err(e),
        };
        self.settle(session, result, tenant, intent)
    }

    /// Take a connection bounded by the statement timeout
    pub(crate) async fn checkout(&self, db: &DatabaseConnection, tenant: &TenantId) -> Result<Session> {
        Session::checkout(db, self.statement_timeout)
            .await
            .map_err(|e| StoreError::from_db(e, tenant, "acquire connection"))
    }

    /// Return the session's connection to the pool unless its statement
    /// overran, and classify any error
    pub(crate) fn settle<T>(
        &self,
        session: Session,
        result: std::result::Result<T, SessionError>,
        tenant: &TenantId,
        intent: &str,
    ) -> Result<T> {
        session
            .finish(result)
            .map_err(|e| StoreError::from_session(e, tenant, intent, self.statement_timeout))
    }
}
