//! Direct debugging of a call statement.
//!
//! The statement under debug runs on its own (target) connection. Before it
//! runs, `plpgsql_oid_debug` arms the debugger for the called routine. Once the
//! execution reaches that routine the target backend announces a port with a
//! `PLDBGBREAK:<port>` notice and waits until a session attaches to it.

use crate::debugger::call::parse_break_notice;
use crate::debugger::error::Error;
use crate::debugger::protocol::connection::{Canceller, Connection, Row, TransportError};
use crate::debugger::protocol::{activate_for_routine, Client};
use crate::debugger::Oid;
use crate::{muted_error, weak_error};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default time given to the target statement to reach the routine.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_millis(3000);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type StatementHandle = JoinHandle<Result<Vec<Row>, Error>>;

/// A call statement stopped in the debugger, waiting on [`TargetCall::port`].
pub struct TargetCall {
    port: i64,
    canceller: Box<dyn Canceller>,
    handle: StatementHandle,
}

impl TargetCall {
    /// Arm the debugger for routine `oid` and run `sql` on the target connection.
    ///
    /// Return when a break notice arrives through `notices`.
    ///
    /// # Errors
    ///
    /// [`Error::ActivationFailed`] if the server refuses to debug the routine, the
    /// statement is not run then. [`Error::BreakNotReached`] if the statement ends
    /// or `timeout` expires without a break notice, a still running statement is
    /// cancelled. Statement failures are returned as [`Error::Statement`].
    pub fn start<C: Connection>(
        mut client: Client<C>,
        oid: Oid,
        sql: &str,
        notices: &Receiver<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        // notices of earlier statements
        while notices.try_recv().is_ok() {}

        if let Err(e) = activate_for_routine(&mut client, oid) {
            muted_error!(client.close(), "close target connection:");
            return Err(e);
        }

        let canceller = client.canceller();
        let sql = sql.to_string();
        let handle = thread::Builder::new()
            .name("pldbg-target".to_string())
            .spawn(move || {
                let result = client.execute(&sql);
                muted_error!(client.close(), "close target connection:");
                result
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(port) = wait_break(notices, deadline) {
                log::info!(target: "debugger", "routine {oid} stopped, debugger port {port}");
                return Ok(Self {
                    port,
                    canceller,
                    handle,
                });
            }

            if handle.is_finished() {
                // the notice is sent before the statement completes
                if let Some(port) = notices.try_iter().find_map(|n| parse_break_notice(&n)) {
                    return Ok(Self {
                        port,
                        canceller,
                        handle,
                    });
                }
                return Err(match join(handle) {
                    Ok(_) => Error::BreakNotReached(oid),
                    Err(e) => e,
                });
            }

            if Instant::now() >= deadline {
                log::warn!(target: "debugger", "no break notice in {timeout:?}, cancel target statement");
                weak_error!(canceller.cancel(), "cancel target statement:");
                muted_error!(join(handle), "target statement:");
                return Err(Error::BreakNotReached(oid));
            }
        }
    }

    /// Port the target backend listens on.
    pub fn port(&self) -> i64 {
        self.port
    }

    /// Return true if the target statement completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Interrupt the target statement.
    pub fn cancel(&self) -> Result<(), Error> {
        self.canceller.cancel().map_err(Error::Cancellation)
    }

    /// Block until the target statement completes and return its rows.
    pub fn wait(self) -> Result<Vec<Row>, Error> {
        join(self.handle)
    }
}

/// Wait for a break notice at most one poll interval.
fn wait_break(notices: &Receiver<String>, deadline: Instant) -> Option<i64> {
    let interval = deadline
        .saturating_duration_since(Instant::now())
        .min(POLL_INTERVAL);
    match notices.recv_timeout(interval) {
        Ok(notice) => {
            log::debug!(target: "debugger", "notice: {notice}");
            parse_break_notice(&notice)
        }
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            thread::sleep(interval);
            None
        }
    }
}

fn join(handle: StatementHandle) -> Result<Vec<Row>, Error> {
    handle.join().unwrap_or_else(|_| {
        Err(Error::Statement(TransportError::Protocol(
            "target thread panicked".to_string(),
        )))
    })
}
