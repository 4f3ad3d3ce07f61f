//! Transport seam between the protocol adapter and a database connection.
//!
//! The adapter never talks to a driver directly: every remote call goes through
//! a [`Connection`] that executes one SQL statement and returns its rows in text
//! form. This keeps the engine independent of the driver and lets tests replace
//! the database with a scripted connection.

use crate::debugger::error::Error;
use crate::debugger::protocol::query::Operation;

/// Failure of the underlying transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("database error: {0}")]
    Database(String),
}

impl TransportError {
    /// Return true if the connection can no longer be used after this error.
    pub fn is_connection_level(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(_) => true,
            TransportError::Protocol(_) => true,
            TransportError::Database(_) => false,
        }
    }
}

/// One result row, every column rendered as text (`None` for SQL `NULL`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row(Vec<Option<String>>);

impl Row {
    pub fn new(columns: Vec<Option<String>>) -> Self {
        Self(columns)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn column(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }

    /// Start consuming columns of this row in order.
    pub fn cursor(&self, op: Operation) -> RowCursor<'_> {
        RowCursor {
            row: self,
            pos: 0,
            op,
        }
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Row {
    fn from_iter<T: IntoIterator<Item = Option<S>>>(iter: T) -> Self {
        Row(iter.into_iter().map(|c| c.map(Into::into)).collect())
    }
}

/// Sequential typed reader over row columns.
pub struct RowCursor<'a> {
    row: &'a Row,
    pos: usize,
    op: Operation,
}

impl<'a> RowCursor<'a> {
    fn next_raw(&mut self) -> Result<Option<&'a str>, Error> {
        let row: &'a Row = self.row;
        let idx = self.pos;
        if idx >= row.len() {
            return Err(self.decode_error(idx, "missing column"));
        }
        self.pos += 1;
        Ok(row.column(idx))
    }

    fn next_value(&mut self) -> Result<(usize, &'a str), Error> {
        let idx = self.pos;
        match self.next_raw()? {
            Some(v) => Ok((idx, v)),
            None => Err(self.decode_error(idx, "unexpected NULL")),
        }
    }

    fn decode_error(&self, column: usize, reason: impl Into<String>) -> Error {
        Error::Decode {
            op: self.op,
            column,
            reason: reason.into(),
        }
    }

    pub fn opt_string(&mut self) -> Result<Option<String>, Error> {
        Ok(self.next_raw()?.map(ToString::to_string))
    }

    pub fn string(&mut self) -> Result<String, Error> {
        self.next_value().map(|(_, v)| v.to_string())
    }

    pub fn long(&mut self) -> Result<i64, Error> {
        let (idx, v) = self.next_value()?;
        v.trim()
            .parse()
            .map_err(|e| self.decode_error(idx, format!("`{v}` is not an integer: {e}")))
    }

    pub fn int(&mut self) -> Result<i32, Error> {
        let (idx, v) = self.next_value()?;
        v.trim()
            .parse()
            .map_err(|e| self.decode_error(idx, format!("`{v}` is not an integer: {e}")))
    }

    pub fn bool(&mut self) -> Result<bool, Error> {
        let (idx, v) = self.next_value()?;
        match v.trim() {
            "t" | "true" | "TRUE" | "1" => Ok(true),
            "f" | "false" | "FALSE" | "0" => Ok(false),
            other => Err(self.decode_error(idx, format!("`{other}` is not a boolean"))),
        }
    }
}

/// A synchronous connection able to run one statement at a time.
pub trait Connection: Send + 'static {
    /// Execute a statement and return all produced rows.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, TransportError>;

    /// Return a handle able to abort statements running on this connection
    /// from another thread.
    fn canceller(&self) -> Box<dyn Canceller>;

    /// Close the connection, any later query fails with [`TransportError::Closed`].
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Aborts in-flight statements of a [`Connection`] from any thread.
pub trait Canceller: Send + Sync {
    fn cancel(&self) -> Result<(), TransportError>;
}
