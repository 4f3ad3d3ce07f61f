//! Client side engine for the PostgreSQL `pldbgapi` debugger.
//!
//! [`debugger`] contains the session engine: protocol adapter, routine source
//! resolver, stack snapshots and the session worker. [`ui`] contains the
//! terminal front-end used by the `pldbg` binary.

pub mod debugger;
pub mod log;
pub mod ui;
