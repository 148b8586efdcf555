//! Checked-out connections with engine-enforced deadlines
//!
//! Every statement this crate issues runs on a connection taken out of the
//! tenant's pool for the length of the call. Before a statement runs the
//! engine is handed its deadline: PostgreSQL through `statement_timeout`,
//! SQLite through a progress handler that interrupts the virtual machine once
//! the deadline has passed. An overrunning statement is therefore stopped by
//! the engine itself.
//!
//! A session that is dropped without `release` detaches its connection from
//! the pool and closes it. The pool slot frees up at once, and a connection
//! that may still be busy is never handed to the next caller. Closing a
//! connection mid-transaction makes the engine roll the transaction back.

use std::future::Future;
use std::time::{Duration, Instant};

use sea_orm::sqlx::pool::PoolConnection;
use sea_orm::sqlx::{self, Executor, Postgres, Sqlite};
use sea_orm::{ConnAcquireErr, DatabaseConnection, DbErr, QueryResult, RuntimeErr, Statement, Values};
use sea_query_binder::SqlxValues;
use tracing::debug;

use crate::error::is_statement_cancelled;

/// Virtual machine instructions between two deadline checks on SQLite
const SQLITE_PROGRESS_OPS: i32 = 1_000;

enum Conn {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

/// What a statement without a result set reported
#[derive(Clone, Copy, Debug)]
pub(crate) struct Executed {
    pub rows_affected: u64,
    /// Rowid of the last inserted row; SQLite only
    pub last_insert_rowid: Option<i64>,
}

#[derive(Debug)]
pub(crate) enum SessionError {
    Db(DbErr),
    /// The statement was still running when its budget ran out
    DeadlineExceeded,
}

impl SessionError {
    /// The statement was stopped at its deadline, by the engine or by us
    pub(crate) fn overran(&self) -> bool {
        match self {
            SessionError::Db(e) => is_statement_cancelled(e),
            SessionError::DeadlineExceeded => true,
        }
    }
}

impl From<DbErr> for SessionError {
    fn from(err: DbErr) -> Self {
        SessionError::Db(err)
    }
}

pub(crate) struct Session {
    conn: Option<Conn>,
    budget: Duration,
    in_transaction: bool,
    armed: bool,
}

impl Session {
    /// Take a connection out of the tenant's pool
    pub(crate) async fn checkout(db: &DatabaseConnection, budget: Duration) -> Result<Self, DbErr> {
        let conn = match db {
            DatabaseConnection::SqlxPostgresPoolConnection(_) => Conn::Postgres(
                db.get_postgres_connection_pool()
                    .acquire()
                    .await
                    .map_err(acquire_err)?,
            ),
            DatabaseConnection::SqlxSqlitePoolConnection(_) => Conn::Sqlite(
                db.get_sqlite_connection_pool()
                    .acquire()
                    .await
                    .map_err(acquire_err)?,
            ),
            _ => return Err(DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed)),
        };

        Ok(Self {
            conn: Some(conn),
            budget,
            in_transaction: false,
            armed: false,
        })
    }

    /// Take a connection and open a transaction on it
    pub(crate) async fn begin(db: &DatabaseConnection, budget: Duration) -> Result<Self, SessionError> {
        let mut session = Self::checkout(db, budget).await?;
        session.control("BEGIN").await?;
        session.in_transaction = true;
        Ok(session)
    }

    /// Commit and hand the connection back to the pool
    ///
    /// A failed commit drops the session, which closes the connection.
    pub(crate) async fn commit(mut self) -> Result<(), SessionError> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        self.release();
        Ok(())
    }

    /// Hand the connection back to the pool. A session still inside a
    /// transaction is closed instead.
    pub(crate) fn release(mut self) {
        if !self.in_transaction {
            drop(self.conn.take());
        }
    }

    /// Give the connection back when the session ended cleanly; drop it
    /// (closing the connection) when a statement overran
    pub(crate) fn finish<T>(self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        match &result {
            Err(e) if e.overran() => drop(self),
            _ => self.release(),
        }
        result
    }

    /// Run a statement that produces rows
    pub(crate) async fn fetch(&mut self, stmt: &Statement) -> Result<Vec<QueryResult>, SessionError> {
        let budget = self.budget;
        let values = bind_values(stmt);
        within(budget, async {
            self.arm().await?;
            let rows: Vec<QueryResult> = match self.conn_mut()? {
                Conn::Postgres(conn) => Executor::fetch_all(&mut **conn, sqlx::query_with::<Postgres, _>(&stmt.sql, values))
                    .await
                    .map_err(query_err)?
                    .into_iter()
                    .map(QueryResult::from)
                    .collect(),
                Conn::Sqlite(conn) => Executor::fetch_all(&mut **conn, sqlx::query_with::<Sqlite, _>(&stmt.sql, values))
                    .await
                    .map_err(query_err)?
                    .into_iter()
                    .map(QueryResult::from)
                    .collect(),
            };
            Ok::<_, DbErr>(rows)
        })
        .await
    }

    /// Run a statement that produces no rows
    pub(crate) async fn execute(&mut self, stmt: &Statement) -> Result<Executed, SessionError> {
        let budget = self.budget;
        let values = bind_values(stmt);
        within(budget, async {
            self.arm().await?;
            let executed = match self.conn_mut()? {
                Conn::Postgres(conn) => {
                    let done = Executor::execute(&mut **conn, sqlx::query_with::<Postgres, _>(&stmt.sql, values))
                        .await
                        .map_err(exec_err)?;
                    Executed {
                        rows_affected: done.rows_affected(),
                        last_insert_rowid: None,
                    }
                }
                Conn::Sqlite(conn) => {
                    let done = Executor::execute(&mut **conn, sqlx::query_with::<Sqlite, _>(&stmt.sql, values))
                        .await
                        .map_err(exec_err)?;
                    Executed {
                        rows_affected: done.rows_affected(),
                        last_insert_rowid: Some(done.last_insert_rowid()),
                    }
                }
            };
            Ok::<_, DbErr>(executed)
        })
        .await
    }

    async fn control(&mut self, sql: &str) -> Result<(), SessionError> {
        let budget = self.budget;
        within(budget, async {
            self.arm().await?;
            let done = match self.conn_mut()? {
                Conn::Postgres(conn) => Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await.map(drop),
                Conn::Sqlite(conn) => Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await.map(drop),
            };
            done.map_err(exec_err)
        })
        .await
    }

    /// Give the engine the deadline of the next statement. PostgreSQL keeps
    /// the setting for the session (or the transaction), SQLite needs a fresh
    /// absolute deadline every time.
    async fn arm(&mut self) -> Result<(), DbErr> {
        let budget = self.budget;
        let in_transaction = self.in_transaction;
        let armed = self.armed;
        let sticks = match self.conn_mut()? {
            Conn::Postgres(_) if armed => true,
            Conn::Postgres(conn) => {
                let scope = if in_transaction { "SET LOCAL" } else { "SET" };
                let millis = budget.as_millis().clamp(1, i32::MAX as u128);
                let sql = format!("{scope} statement_timeout = {millis}");
                Executor::execute(&mut **conn, sqlx::raw_sql(&sql))
                    .await
                    .map_err(exec_err)?;
                // SET LOCAL ends with the transaction
                !in_transaction
            }
            Conn::Sqlite(conn) => {
                let deadline = Instant::now() + budget;
                let mut handle = conn.lock_handle().await.map_err(exec_err)?;
                handle.set_progress_handler(SQLITE_PROGRESS_OPS, move || Instant::now() < deadline);
                false
            }
        };
        self.armed = sticks;
        Ok(())
    }

    fn conn_mut(&mut self) -> Result<&mut Conn, DbErr> {
        self.conn
            .as_mut()
            .ok_or(DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        debug!(
            in_transaction = self.in_transaction,
            "Closing abandoned connection instead of returning it to the pool"
        );
        match conn {
            Conn::Postgres(conn) => drop(conn.detach()),
            Conn::Sqlite(conn) => drop(conn.detach()),
        }
    }
}

/// Bound `work` by the budget on our side too; the engine-side deadline
/// does not cover waiting on locks
async fn within<T>(
    budget: Duration,
    work: impl Future<Output = Result<T, DbErr>>,
) -> Result<T, SessionError> {
    match tokio::time::timeout(budget, work).await {
        Ok(result) => result.map_err(SessionError::Db),
        Err(_) => Err(SessionError::DeadlineExceeded),
    }
}

fn bind_values(stmt: &Statement) -> SqlxValues {
    SqlxValues(stmt.values.clone().unwrap_or(Values(Vec::new())))
}

fn acquire_err(err: sqlx::Error) -> DbErr {
    match err {
        sqlx::Error::PoolTimedOut => DbErr::ConnectionAcquire(ConnAcquireErr::Timeout),
        sqlx::Error::PoolClosed => DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed),
        other => DbErr::Conn(RuntimeErr::SqlxError(other)),
    }
}

fn query_err(err: sqlx::Error) -> DbErr {
    DbErr::Query(RuntimeErr::SqlxError(err))
}

fn exec_err(err: sqlx::Error) -> DbErr {
    DbErr::Exec(RuntimeErr::SqlxError(err))
}
