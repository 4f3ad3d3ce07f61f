//! Protocol adapter of the `pldbgapi` extension.
//!
//! Every debugger operation is a call of a SQL function. [`Client`] renders the
//! call from a fixed template (see [`query`]), executes it on the underlying
//! [`Connection`] and decodes result rows into typed records.

pub mod connection;
pub mod postgres;
pub mod query;

use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::error::Error;
use crate::debugger::snapshot::{Extension, StackResult, StepResult};
use crate::debugger::source::RawRoutine;
use crate::debugger::variable::{VarClass, VariableRecord};
use crate::debugger::Oid;
use connection::{Canceller, Connection, Row, RowCursor, TransportError};
use query::{Arg, Operation};
use std::fmt::{Display, Formatter};

/// Name of the server extension providing the debugger API.
pub const DEBUGGER_EXTENSION: &str = "pldbgapi";

/// Activation code returned by `plpgsql_oid_debug` on success.
pub const ACTIVATION_OK: i64 = 0;

/// Identifier of a remote debug session, assigned by the server on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(i64);

impl SessionHandle {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn id(self) -> i64 {
        self.0
    }
}

impl Display for SessionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SessionHandle> for Arg {
    fn from(session: SessionHandle) -> Self {
        Arg::Int(session.0)
    }
}

/// Typed request/response access to the remote debugger.
pub struct Client<C: Connection> {
    conn: C,
}

impl<C: Connection> Client<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn canceller(&self) -> Box<dyn Canceller> {
        self.conn.canceller()
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.conn.close()
    }

    /// Run a user statement, like the call of a routine under debug.
    pub fn execute(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        log::debug!(target: "debugger", "execute: {sql}");
        self.conn.query(sql).map_err(Error::Statement)
    }

    fn fetch(&mut self, op: Operation, args: &[Arg]) -> Result<Vec<Row>, Error> {
        let sql = query::render(op, args)?;
        log::debug!(target: "debugger", "{op}: {sql}");
        self.conn
            .query(&sql)
            .map_err(|source| Error::Transport { op, source })
    }

    fn fetch_one<T>(
        &mut self,
        op: Operation,
        args: &[Arg],
        decode: impl FnOnce(&mut RowCursor) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let rows = self.fetch(op, args)?;
        let row = rows.first().ok_or(Error::UnexpectedRowCount(op))?;
        decode(&mut row.cursor(op))
    }

    fn fetch_all<T>(
        &mut self,
        op: Operation,
        args: &[Arg],
        decode: impl Fn(&mut RowCursor) -> Result<T, Error>,
    ) -> Result<Vec<T>, Error> {
        self.fetch(op, args)?
            .iter()
            .map(|row| decode(&mut row.cursor(op)))
            .collect()
    }

    fn session(&mut self, op: Operation, args: &[Arg]) -> Result<SessionHandle, Error> {
        self.fetch_one(op, args, |c| c.long().map(SessionHandle))
    }

    fn step(&mut self, op: Operation, session: SessionHandle) -> Result<StepResult, Error> {
        self.fetch_one(op, &[session.into()], decode_step)
    }

    fn acknowledge(&mut self, op: Operation, args: &[Arg]) -> Result<bool, Error> {
        self.fetch_one(op, args, |c| c.bool())
    }

    /// Attach to a target backend waiting on `port`.
    pub fn attach_to_port(&mut self, port: i64) -> Result<SessionHandle, Error> {
        self.session(Operation::AttachToPort, &[port.into()])
    }

    /// Open a listener for indirect debugging.
    pub fn create_listener(&mut self) -> Result<SessionHandle, Error> {
        self.session(Operation::CreateListener, &[])
    }

    /// Block until some backend reaches a global breakpoint of `listener`,
    /// return the pid of that backend. The listener stays the session handle.
    pub fn wait_for_target(&mut self, listener: SessionHandle) -> Result<i64, Error> {
        self.fetch_one(Operation::WaitForTarget, &[listener.into()], |c| c.long())
    }

    /// Ask the server to debug the next call of routine `oid` in this backend.
    pub fn debug_by_routine_id(&mut self, oid: Oid) -> Result<i64, Error> {
        self.fetch_one(Operation::DebugByRoutineId, &[oid.into()], |c| c.long())
    }

    pub fn step_over(&mut self, session: SessionHandle) -> Result<StepResult, Error> {
        self.step(Operation::StepOver, session)
    }

    pub fn step_into(&mut self, session: SessionHandle) -> Result<StepResult, Error> {
        self.step(Operation::StepInto, session)
    }

    pub fn resume(&mut self, session: SessionHandle) -> Result<StepResult, Error> {
        self.step(Operation::Resume, session)
    }

    /// Return the top frame of the target stack.
    pub fn get_stack(&mut self, session: SessionHandle) -> Result<StackResult, Error> {
        self.fetch_one(Operation::GetStack, &[session.into()], decode_frame)
    }

    /// Return the whole target stack, top frame first.
    pub fn get_frames(&mut self, session: SessionHandle) -> Result<Vec<StackResult>, Error> {
        self.fetch_all(Operation::GetStack, &[session.into()], decode_frame)
    }

    pub fn get_variables(&mut self, session: SessionHandle) -> Result<Vec<VariableRecord>, Error> {
        self.fetch_all(Operation::GetVariables, &[session.into()], |c| {
            Ok(VariableRecord::new(
                c.string()?,
                VarClass::from_code(&c.string()?),
                c.int()?,
                c.bool()?,
                c.bool()?,
                c.bool()?,
                c.long()?,
                c.opt_string()?.unwrap_or_else(|| "NULL".to_string()),
                c.opt_string()?,
            ))
        })
    }

    /// Return catalog information of routine `oid`.
    pub fn get_routine_source(&mut self, oid: Oid) -> Result<RawRoutine, Error> {
        let mut routines =
            self.fetch_all(Operation::GetRoutineSource, &[oid.into()], decode_routine)?;
        if routines.is_empty() {
            return Err(Error::RoutineNotFound(oid));
        }
        Ok(routines.swap_remove(0))
    }

    /// Return all routines named `schema.name` ordered by oid.
    pub fn search_routines(&mut self, schema: &str, name: &str) -> Result<Vec<RawRoutine>, Error> {
        self.fetch_all(
            Operation::SearchRoutines,
            &[schema.into(), name.into()],
            decode_routine,
        )
    }

    pub fn set_global_breakpoint(&mut self, session: SessionHandle, oid: Oid) -> Result<bool, Error> {
        self.acknowledge(Operation::SetGlobalBreakpoint, &[session.into(), oid.into()])
    }

    pub fn set_breakpoint(
        &mut self,
        session: SessionHandle,
        oid: Oid,
        line: i32,
    ) -> Result<bool, Error> {
        self.acknowledge(
            Operation::SetBreakpoint,
            &[session.into(), oid.into(), i64::from(line).into()],
        )
    }

    pub fn drop_breakpoint(
        &mut self,
        session: SessionHandle,
        oid: Oid,
        line: i32,
    ) -> Result<bool, Error> {
        self.acknowledge(
            Operation::DropBreakpoint,
            &[session.into(), oid.into(), i64::from(line).into()],
        )
    }

    pub fn list_breakpoints(&mut self, session: SessionHandle) -> Result<Vec<Breakpoint>, Error> {
        self.fetch_all(Operation::ListBreakpoints, &[session.into()], |c| {
            let step = decode_step(c)?;
            Ok(Breakpoint {
                oid: step.target_oid,
                line: step.line,
                target_name: step.target_name,
            })
        })
    }

    /// Abort the target statement, the session stays attached.
    pub fn abort_target(&mut self, session: SessionHandle) -> Result<bool, Error> {
        self.acknowledge(Operation::AbortTarget, &[session.into()])
    }

    pub fn extensions(&mut self) -> Result<Vec<Extension>, Error> {
        self.fetch_all(Operation::ListExtensions, &[], |c| {
            Ok(Extension {
                schema: c.string()?,
                name: c.string()?,
                version: c.string()?,
            })
        })
    }

    /// Check that the debugger extension is installed in the current database.
    pub fn check_extension(&mut self) -> Result<Extension, Error> {
        self.extensions()?
            .into_iter()
            .find(|ext| ext.name == DEBUGGER_EXTENSION)
            .ok_or(Error::ExtensionMissing(DEBUGGER_EXTENSION))
    }
}

/// Activate debugging of routine `oid`, fail unless the server returns [`ACTIVATION_OK`].
pub fn activate_for_routine<C: Connection>(client: &mut Client<C>, oid: Oid) -> Result<i64, Error> {
    let code = client.debug_by_routine_id(oid)?;
    if code != ACTIVATION_OK {
        return Err(Error::ActivationFailed(code));
    }
    Ok(code)
}

fn decode_step(c: &mut RowCursor) -> Result<StepResult, Error> {
    Ok(StepResult {
        target_oid: c.long()?,
        line: c.int()?,
        target_name: c.opt_string()?.unwrap_or_default(),
    })
}

fn decode_frame(c: &mut RowCursor) -> Result<StackResult, Error> {
    let level = c.int()?;
    let target_name = c.opt_string()?.unwrap_or_default();
    let target_oid = c.long()?;
    let line = c.int()?;
    let args = c.opt_string()?.unwrap_or_default();
    let digest = c.opt_string()?;
    Ok(StackResult {
        level,
        args,
        digest,
        step: StepResult {
            target_oid,
            line,
            target_name,
        },
    })
}

fn decode_routine(c: &mut RowCursor) -> Result<RawRoutine, Error> {
    Ok(RawRoutine {
        oid: c.long()?,
        schema: c.string()?,
        name: c.string()?,
        arguments: c.opt_string()?.unwrap_or_default(),
        definition: c.string()?,
        body: c.string()?,
        digest: c.opt_string()?,
    })
}
