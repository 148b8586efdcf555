//! Transactional batches
//!
//! A `TransactionScope` owns one connection for its whole life. Statements on
//! a scope must be issued one at a time; a second statement while another is
//! in flight, a wait exceeding the transaction timeout, or any use after a
//! failure is reported as `TransactionMisuse`. A failed or abandoned scope
//! closes its connection, and the engine rolls the transaction back; the
//! connection never goes back to the pool.

use std::time::Duration;

use confstore_common::TenantId;
use sea_orm::{DbBackend, Statement, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::StorageClient;
use crate::error::{Result, StoreError, is_statement_cancelled};
use crate::executor::{ExecOutcome, StatementKind, run_statement};
use crate::session::{Session, SessionError};

/// One statement of a batch, optionally labelled for error reporting
#[derive(Clone, Debug)]
pub struct Mutation {
    pub label: Option<String>,
    pub sql: String,
    pub params: Vec<Value>,
}

impl Mutation {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            label: None,
            sql: sql.into(),
            params,
        }
    }

    pub fn labeled(label: impl Into<String>, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(sql, params)
        }
    }

    pub fn from_statement(label: impl Into<String>, stmt: Statement) -> Self {
        Self {
            label: Some(label.into()),
            sql: stmt.sql,
            params: stmt.values.map(|values| values.0).unwrap_or_default(),
        }
    }

    fn identity(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => StatementKind::classify(&self.sql).to_string(),
        }
    }

    fn into_statement(self, backend: DbBackend) -> Statement {
        Statement::from_sql_and_values(backend, &self.sql, self.params)
    }
}

enum ScopeState {
    Active(Session),
    Finished(&'static str),
}

pub struct TransactionScope {
    tenant: TenantId,
    backend: DbBackend,
    timeout: Duration,
    state: Mutex<ScopeState>,
}

impl TransactionScope {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Execute raw SQL inside the transaction
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecOutcome> {
        let stmt = Statement::from_sql_and_values(self.backend, sql, params);
        self.execute_statement(stmt).await
    }

    pub async fn execute_statement(&self, stmt: Statement) -> Result<ExecOutcome> {
        let mut state = self.state.try_lock().map_err(|_| {
            StoreError::TransactionMisuse(
                "another statement is already in flight on this transaction".to_string(),
            )
        })?;

        let kind = StatementKind::classify(&stmt.sql);
        let result = match &mut *state {
            ScopeState::Active(session) => run_statement(session, &stmt).await,
            ScopeState::Finished(how) => {
                return Err(StoreError::TransactionMisuse(format!(
                    "transaction already {how}"
                )));
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(SessionError::Db(e)) if !is_statement_cancelled(&e) => {
                self.abort(&mut state, "statement failed");
                Err(StoreError::from_db(e, &self.tenant, kind.as_str()))
            }
            Err(_) => {
                self.abort(&mut state, "statement timed out");
                Err(StoreError::TransactionMisuse(format!(
                    "{kind} did not complete within {}ms; the transaction may be waiting on itself",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// Make the transaction's effects durable
    pub async fn commit(self) -> Result<()> {
        match self.state.into_inner() {
            ScopeState::Active(session) => match session.commit().await {
                Ok(()) => {
                    debug!(tenant = %self.tenant, "Transaction committed");
                    Ok(())
                }
                Err(SessionError::Db(e)) if !is_statement_cancelled(&e) => {
                    Err(StoreError::from_db(e, &self.tenant, "commit"))
                }
                Err(_) => Err(StoreError::TransactionMisuse(format!(
                    "commit did not complete within {}ms",
                    self.timeout.as_millis()
                ))),
            },
            ScopeState::Finished(how) => Err(StoreError::TransactionMisuse(format!(
                "transaction already {how}"
            ))),
        }
    }

    /// Discard the transaction's effects
    ///
    /// The connection is closed rather than returned to the pool, and the
    /// engine discards the open transaction with it, so this never waits.
    pub fn rollback(self) -> Result<()> {
        match self.state.into_inner() {
            ScopeState::Active(session) => {
                drop(session);
                debug!(tenant = %self.tenant, "Transaction rolled back");
                Ok(())
            }
            ScopeState::Finished(how) => Err(StoreError::TransactionMisuse(format!(
                "transaction already {how}"
            ))),
        }
    }

    fn abort(&self, state: &mut ScopeState, cause: &str) {
        if let ScopeState::Active(session) = std::mem::replace(state, ScopeState::Finished("rolled back")) {
            drop(session);
            warn!(tenant = %self.tenant, cause = cause, "Transaction rolled back");
        }
    }
}

impl StorageClient {
    /// Open a transaction on one of the tenant's pooled connections
    pub async fn begin(&self, tenant: &TenantId) -> Result<TransactionScope> {
        let db = self.connection(tenant).await?;
        let session = Session::begin(&db, self.transaction_timeout)
            .await
            .map_err(|e| {
                StoreError::from_session(e, tenant, "begin transaction", self.transaction_timeout)
            })?;

        Ok(TransactionScope {
            tenant: tenant.clone(),
            backend: self.backend(),
            timeout: self.transaction_timeout,
            state: Mutex::new(ScopeState::Active(session)),
        })
    }

    /// Run every mutation in one transaction; either all apply or none do
    pub async fn run_in_transaction(
        &self,
        tenant: &TenantId,
        work: Vec<Mutation>,
    ) -> Result<Vec<ExecOutcome>> {
        let scope = self.begin(tenant).await?;
        let total = work.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, mutation) in work.into_iter().enumerate() {
            let label = mutation.identity();
            match scope
                .execute_statement(mutation.into_statement(scope.backend))
                .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(source) => {
                    warn!(
                        tenant = %tenant,
                        index = index,
                        label = %label,
                        error = %source,
                        "Batch aborted"
                    );
                    return Err(StoreError::Batch {
                        index,
                        label,
                        source: Box::new(source),
                    });
                }
            }
        }

        scope.commit().await?;
        info!(tenant = %tenant, operations = total, "Batch committed");
        Ok(outcomes)
    }
}
