//! [`Connection`] implementation over a PostgreSQL server.
//!
//! Statements run through the simple query protocol so every value arrives in
//! text form, whatever its SQL type. The driver is asynchronous, a private
//! single threaded runtime makes it blocking.

use crate::debugger::protocol::connection::{Canceller, Connection, Row, TransportError};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection as _, Row as _};
use std::future::Future;
use tokio::runtime::Runtime;

/// SQLSTATE of `admin_shutdown` and `query_canceled`.
const TERMINATION_CODES: [&str; 2] = ["57P01", "57014"];

impl From<sqlx::Error> for TransportError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db)
                if db
                    .code()
                    .is_some_and(|code| TERMINATION_CODES.contains(&code.as_ref())) =>
            {
                TransportError::Closed
            }
            sqlx::Error::Database(db) => TransportError::Database(db.message().to_string()),
            sqlx::Error::Io(e) => TransportError::Io(e),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => TransportError::Closed,
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

fn runtime() -> Result<Runtime, TransportError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Blocking connection to a PostgreSQL backend.
pub struct PostgresConnection {
    runtime: Runtime,
    conn: Option<PgConnection>,
    options: PgConnectOptions,
    backend_pid: i32,
}

impl PostgresConnection {
    /// Open a connection and remember its backend pid for later cancellation.
    pub fn connect(options: PgConnectOptions) -> Result<Self, TransportError> {
        let runtime = runtime()?;
        let (conn, backend_pid) = runtime.block_on(async {
            let mut conn = PgConnection::connect_with(&options).await?;
            let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
                .fetch_one(&mut conn)
                .await?;
            Ok::<_, TransportError>((conn, pid))
        })?;
        log::debug!(target: "debugger", "connected to backend {backend_pid}");

        Ok(Self {
            runtime,
            conn: Some(conn),
            options,
            backend_pid,
        })
    }

    fn block_on<F: Future>(&self, f: F) -> F::Output {
        self.runtime.block_on(f)
    }
}

fn to_row(row: &PgRow) -> Result<Row, TransportError> {
    (0..row.len())
        .map(|idx| row.try_get_unchecked::<Option<String>, _>(idx))
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
        .map_err(TransportError::from)
}

impl Connection for PostgresConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::Closed)?;
        let rows = self
            .runtime
            .block_on(sqlx::raw_sql(sql).fetch_all(&mut *conn))?;
        rows.iter().map(to_row).collect()
    }

    fn canceller(&self) -> Box<dyn Canceller> {
        Box::new(PostgresCanceller {
            options: self.options.clone(),
            backend_pid: self.backend_pid,
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.conn.take() {
            Some(conn) => Ok(self.block_on(conn.close())?),
            None => Ok(()),
        }
    }
}

/// Target of `sqlx` log records carrying server notices.
pub const NOTICE_LOG_TARGET: &str = "sqlx::postgres::notice";

/// Terminates the backend of a [`PostgresConnection`] through a side connection.
struct PostgresCanceller {
    options: PgConnectOptions,
    backend_pid: i32,
}

impl Canceller for PostgresCanceller {
    fn cancel(&self) -> Result<(), TransportError> {
        log::debug!(target: "debugger", "terminate backend {}", self.backend_pid);
        runtime()?.block_on(async {
            let mut side = PgConnection::connect_with(&self.options).await?;
            sqlx::query("SELECT pg_terminate_backend($1)")
                .bind(self.backend_pid)
                .execute(&mut side)
                .await?;
            side.close().await?;
            Ok::<_, TransportError>(())
        })
    }
}
